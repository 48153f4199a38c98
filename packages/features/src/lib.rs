#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Points-of-interest feature engine.
//!
//! Turns the POI geometries of each configured category into numeric
//! features for a list of locations. Every feature uses the
//! degree-distance x [`KM_PER_DEGREE`](house_price_spatial::KM_PER_DEGREE)
//! convention from [`house_price_spatial`], and every threshold is in
//! kilometres.
//!
//! When no POI lies within the threshold the aggregations fall back to
//! defined values instead of failing: `count` is 0, `shortest_distance`
//! is the threshold itself and `average_distance` is 0.

pub mod table;

use std::collections::BTreeMap;

use house_price_features_models::{AggregationMethod, FeatureSpec};
use house_price_property_models::Coordinate;
use house_price_spatial::CentroidIndex;
use thiserror::Error;

pub use table::FeatureTable;

/// Errors from feature computation.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// The distance threshold is zero, negative or not finite.
    #[error("Invalid distance threshold: {threshold_km} km (must be finite and > 0)")]
    InvalidThreshold {
        /// The rejected threshold.
        threshold_km: f64,
    },
}

/// The POIs of one category, reduced to indexed centroids.
pub struct PoiSet {
    category: String,
    index: CentroidIndex,
}

impl PoiSet {
    /// Builds a set from raw geometries, keeping each geometry's centroid.
    #[must_use]
    pub fn from_geometries(category: impl Into<String>, geometries: &[geo::Geometry<f64>]) -> Self {
        Self {
            category: category.into(),
            index: CentroidIndex::from_geometries(geometries),
        }
    }

    /// Builds a set from POI locations directly.
    #[must_use]
    pub fn from_coordinates(category: impl Into<String>, points: Vec<Coordinate>) -> Self {
        Self {
            category: category.into(),
            index: CentroidIndex::from_coordinates(points),
        }
    }

    /// A set with no POIs.
    #[must_use]
    pub fn empty(category: impl Into<String>) -> Self {
        Self::from_coordinates(category, Vec::new())
    }

    /// Category name.
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Number of POIs in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the set holds no POIs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Computes one feature for one location.
///
/// `threshold_km` is assumed valid (finite, > 0); [`compute_feature_table`]
/// checks it before calling this.
#[must_use]
pub fn compute_feature(
    coordinate: Coordinate,
    poi_set: &PoiSet,
    threshold_km: f64,
    method: AggregationMethod,
) -> f64 {
    let within = poi_set.index.distances_within_km(coordinate, threshold_km);

    match method {
        #[allow(clippy::cast_precision_loss)]
        AggregationMethod::Count => within.len() as f64,
        AggregationMethod::AverageDistance => {
            if within.is_empty() {
                log::trace!(
                    "No {} POIs within {threshold_km} km of {coordinate:?}, average distance is 0",
                    poi_set.category
                );
                return 0.0;
            }
            #[allow(clippy::cast_precision_loss)]
            let n = within.len() as f64;
            within.iter().sum::<f64>() / n
        }
        AggregationMethod::ShortestDistance => within.into_iter().fold(threshold_km, f64::min),
    }
}

/// Computes every (category, method) feature for every point.
///
/// Rows follow the order of `points`; columns follow the order of
/// `feature_specs` and, within a spec, the order of its methods. A category
/// with no entry in `poi_sets` is treated as having no POIs.
///
/// # Errors
///
/// Returns [`FeatureError::InvalidThreshold`] if `threshold_km` is not a
/// finite positive number.
pub fn compute_feature_table(
    points: &[Coordinate],
    feature_specs: &[FeatureSpec],
    threshold_km: f64,
    poi_sets: &BTreeMap<String, PoiSet>,
) -> Result<FeatureTable, FeatureError> {
    if !threshold_km.is_finite() || threshold_km <= 0.0 {
        return Err(FeatureError::InvalidThreshold { threshold_km });
    }

    let mut columns = Vec::new();
    let mut values = Vec::new();

    for spec in feature_specs {
        let missing;
        let poi_set = if let Some(set) = poi_sets.get(&spec.name) {
            set
        } else {
            log::debug!("No POI set for category '{}', using an empty set", spec.name);
            missing = PoiSet::empty(spec.name.as_str());
            &missing
        };

        for method in &spec.methods {
            columns.push(spec.column_name(*method));
            values.push(
                points
                    .iter()
                    .map(|p| compute_feature(*p, poi_set, threshold_km, *method))
                    .collect::<Vec<f64>>(),
            );
        }
    }

    Ok(FeatureTable::from_columns(points.len(), columns, &values))
}

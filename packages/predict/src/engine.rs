//! Single-location price prediction.

use std::collections::BTreeMap;
use std::str::FromStr as _;

use chrono::NaiveDate;
use house_price_features::{PoiSet, compute_feature_table};
use house_price_features_models::FeatureSpec;
use house_price_property_models::{BoundingBox, Coordinate, PropertyType, Transaction};
use house_price_source::{PoiSource, SourceError, TransactionSource};
use house_price_spatial::{KM_PER_DEGREE, bounding_box};
use ndarray::{Array1, Array2, s};
use serde::{Deserialize, Serialize};

use crate::PredictError;
use crate::config::PredictionConfig;
use crate::glm::{self, ModelFamily};
use crate::sampler::collect_sample;

/// Name of the constant design column in [`Prediction::columns`].
pub const INTERCEPT_COLUMN: &str = "intercept";

/// Where and when to predict a price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    /// Location of the property.
    pub center: Coordinate,
    /// Date the price is wanted for.
    pub date: NaiveDate,
    /// Restricts the sample to this property type until the fallback.
    pub property_type: Option<PropertyType>,
}

/// A predicted price together with how it was obtained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Predicted price in pounds.
    pub price: f64,
    /// Model family that produced the price.
    pub model: ModelFamily,
    /// Realized sampling box side length in degrees.
    pub bbox_size: f64,
    /// POI distance threshold used for the features.
    pub distance_threshold_km: f64,
    /// Transactions returned by the sampler, before filtering.
    pub sample_size: usize,
    /// Rows of the design matrix the model was fitted on.
    pub training_rows: usize,
    /// Sample size when it fell short of the requirement.
    pub shortfall: Option<usize>,
    /// Whether the property type filter was dropped.
    pub fallback_used: bool,
    /// Design columns, intercept first.
    pub columns: Vec<String>,
    /// Fitted coefficient per design column.
    pub coefficients: Vec<f64>,
    /// Whether the model fit converged.
    pub converged: bool,
}

/// Feature values for a single location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationFeatures {
    /// The location described.
    pub center: Coordinate,
    /// Box side length the POIs were fetched for, in degrees.
    pub bbox_size: f64,
    /// Distance threshold used, in kilometres.
    pub distance_threshold_km: f64,
    /// Feature column names.
    pub columns: Vec<String>,
    /// One value per column.
    pub values: Vec<f64>,
}

/// Fetches one [`PoiSet`] per feature category inside `bbox`.
///
/// # Errors
///
/// Returns [`SourceError`] if any POI query fails.
pub fn fetch_poi_sets<P: PoiSource + ?Sized>(
    pois: &P,
    bbox: &BoundingBox,
    specs: &[FeatureSpec],
) -> Result<BTreeMap<String, PoiSet>, SourceError> {
    let mut sets = BTreeMap::new();
    for spec in specs {
        let geometries = pois.query(bbox, spec)?;
        log::debug!("Fetched {} '{}' POIs", geometries.len(), spec.name);
        sets.insert(spec.name.clone(), PoiSet::from_geometries(spec.name.as_str(), &geometries));
    }
    Ok(sets)
}

/// Resolves the configured model name.
///
/// # Errors
///
/// Returns [`PredictError::UnsupportedModel`] for an unknown family.
pub fn resolve_model(config: &PredictionConfig) -> Result<ModelFamily, PredictError> {
    ModelFamily::from_str(config.model.trim())
        .map_err(|_| PredictError::UnsupportedModel(config.model.clone()))
}

/// Distance threshold for a realized sampling box.
fn distance_threshold_km(config: &PredictionConfig, bbox_size: f64) -> f64 {
    config
        .distance_threshold_km
        .unwrap_or(bbox_size / 2.0 * KM_PER_DEGREE)
}

/// Predicts the price of a property at `request.center`.
///
/// `filter`, when given, is applied to the sampled transactions after
/// sampling; only those it accepts are used for training. The evaluation
/// harness uses it to leave the validated record out.
///
/// # Errors
///
/// Returns [`PredictError`] if the configuration or model is invalid, a
/// source fails, too few transactions remain, or the fit fails.
pub fn predict_price<T, P>(
    transactions: &T,
    pois: &P,
    request: &PredictionRequest,
    config: &PredictionConfig,
    filter: Option<&dyn Fn(&Transaction) -> bool>,
) -> Result<Prediction, PredictError>
where
    T: TransactionSource + ?Sized,
    P: PoiSource + ?Sized,
{
    config.validate()?;
    let model = resolve_model(config)?;

    let sample = collect_sample(
        transactions,
        request.center,
        request.date,
        request.property_type,
        &config.sampler,
    )?;
    let sample_size = sample.transactions.len();

    let threshold_km = distance_threshold_km(config, sample.bbox_size);
    let feature_bbox_size = sample.bbox_size * 2.0;

    let training: Vec<Transaction> = match filter {
        Some(keep) => sample.transactions.into_iter().filter(|t| keep(t)).collect(),
        None => sample.transactions,
    };
    if training.is_empty() {
        return Err(PredictError::InsufficientData {
            achieved: 0,
            required: config.sampler.required_sample_size,
        });
    }

    let feature_bbox = bounding_box(request.center, feature_bbox_size, feature_bbox_size);
    let poi_sets = fetch_poi_sets(pois, &feature_bbox, &config.features)?;

    let mut points: Vec<Coordinate> = training.iter().map(Transaction::coordinate).collect();
    points.push(request.center);
    let table = compute_feature_table(&points, &config.features, threshold_km, &poi_sets)?;

    let Some((features, target)) = table.split_last() else {
        return Err(PredictError::InsufficientData {
            achieved: 0,
            required: config.sampler.required_sample_size,
        });
    };
    let design: Array2<f64> = glm::with_intercept(features);
    #[allow(clippy::cast_precision_loss)]
    let response: Array1<f64> = training.iter().map(|t| t.price as f64).collect();

    let fitted = glm::fit(model, design.view(), response.view())?;

    let mut target_row = Array1::<f64>::ones(target.len() + 1);
    target_row.slice_mut(s![1..]).assign(&target);
    let price = fitted.predict(target_row.view())?;

    let mut columns = Vec::with_capacity(table.n_columns() + 1);
    columns.push(INTERCEPT_COLUMN.to_string());
    columns.extend(table.columns().iter().cloned());

    for (column, coefficient) in columns.iter().zip(&fitted.coefficients) {
        log::debug!("  {column}: {coefficient}");
    }
    log::info!(
        "Predicted {price:.0} from {} training rows with a {model} model",
        design.nrows()
    );

    Ok(Prediction {
        price,
        model,
        bbox_size: sample.bbox_size,
        distance_threshold_km: threshold_km,
        sample_size,
        training_rows: design.nrows(),
        shortfall: sample.shortfall,
        fallback_used: sample.fallback_used,
        columns,
        coefficients: fitted.coefficients.to_vec(),
        converged: fitted.converged,
    })
}

/// Computes the feature row for `center` using the configured features
/// and the initial sampling box size.
///
/// # Errors
///
/// Returns [`PredictError`] if the configuration is invalid or a POI query
/// fails.
pub fn features_at<P: PoiSource + ?Sized>(
    pois: &P,
    center: Coordinate,
    config: &PredictionConfig,
) -> Result<LocationFeatures, PredictError> {
    config.validate()?;

    let bbox_size = config.sampler.initial_bbox_size;
    let threshold_km = distance_threshold_km(config, bbox_size);
    let feature_bbox = bounding_box(center, bbox_size * 2.0, bbox_size * 2.0);
    let poi_sets = fetch_poi_sets(pois, &feature_bbox, &config.features)?;
    let table = compute_feature_table(&[center], &config.features, threshold_km, &poi_sets)?;

    Ok(LocationFeatures {
        center,
        bbox_size,
        distance_threshold_km: threshold_km,
        columns: table.columns().to_vec(),
        values: table.row(0).to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use house_price_features_models::{AggregationMethod, TagFilter};
    use house_price_source::{InMemoryPoiSource, InMemoryTransactionSource, TaggedGeometry};

    use super::*;
    use crate::config::SamplerConfig;

    const CENTER: Coordinate = Coordinate::new(51.5, -0.1);

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 6, 1).unwrap()
    }

    fn transaction(id: &str, price: u64, lat: f64, lon: f64) -> Transaction {
        Transaction {
            unique_id: id.to_string(),
            price,
            date_of_transfer: date(),
            property_type: PropertyType::Terraced,
            latitude: lat,
            longitude: lon,
            postcode: None,
        }
    }

    fn three_sales() -> InMemoryTransactionSource {
        InMemoryTransactionSource::new(vec![
            transaction("a", 100, 51.5, -0.1),
            transaction("b", 200, 51.502, -0.1),
            transaction("c", 300, 51.498, -0.099),
        ])
    }

    fn one_school() -> InMemoryPoiSource {
        InMemoryPoiSource::new(vec![TaggedGeometry::point(
            CENTER,
            &[("amenity", "school")],
        )])
    }

    fn config(model: &str) -> PredictionConfig {
        PredictionConfig {
            model: model.to_string(),
            parallel: false,
            distance_threshold_km: None,
            sampler: SamplerConfig {
                required_sample_size: 3,
                ..SamplerConfig::default()
            },
            features: vec![FeatureSpec {
                name: "school".to_string(),
                tags: [("amenity".to_string(), TagFilter::Value("school".to_string()))]
                    .into_iter()
                    .collect(),
                methods: vec![AggregationMethod::Count, AggregationMethod::ShortestDistance],
            }],
        }
    }

    fn request() -> PredictionRequest {
        PredictionRequest {
            center: CENTER,
            date: date(),
            property_type: None,
        }
    }

    #[test]
    fn predicts_from_first_box() {
        let prediction = predict_price(
            &three_sales(),
            &one_school(),
            &request(),
            &config("poisson"),
            None,
        )
        .unwrap();

        assert!((prediction.bbox_size - 0.01).abs() < f64::EPSILON);
        assert_eq!(prediction.sample_size, 3);
        assert_eq!(prediction.training_rows, 3);
        assert_eq!(prediction.shortfall, None);
        assert_eq!(
            prediction.columns,
            vec!["intercept", "school_count", "school_shortest_distance"]
        );
        assert_eq!(prediction.coefficients.len(), 3);
        assert!((prediction.distance_threshold_km - 0.005 * KM_PER_DEGREE).abs() < 1e-9);
        assert!(prediction.price.is_finite());
        assert!(prediction.price > 0.0);
    }

    #[test]
    fn constant_features_reduce_to_the_mean() {
        let sales = three_sales();
        // No POIs: count is 0 and shortest distance is the threshold for
        // every row, so both feature columns are aliased.
        let pois = InMemoryPoiSource::default();

        for model in ["poisson", "gaussian"] {
            let prediction = predict_price(&sales, &pois, &request(), &config(model), None).unwrap();
            assert!((prediction.price - 200.0).abs() < 1e-6, "{model}: {}", prediction.price);
            assert!(prediction.coefficients[1].abs() < f64::EPSILON);
            assert!(prediction.coefficients[2].abs() < f64::EPSILON);
        }
    }

    #[test]
    fn leave_one_out_drops_a_training_row() {
        let keep = |t: &Transaction| t.unique_id != "c";
        let prediction = predict_price(
            &three_sales(),
            &InMemoryPoiSource::default(),
            &request(),
            &config("gaussian"),
            Some(&keep),
        )
        .unwrap();

        assert_eq!(prediction.sample_size, 3);
        assert_eq!(prediction.training_rows, 2);
        assert!((prediction.price - 150.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_unknown_model() {
        let result = predict_price(
            &three_sales(),
            &one_school(),
            &request(),
            &config("random_forest"),
            None,
        );
        assert!(matches!(
            result,
            Err(PredictError::UnsupportedModel(name)) if name == "random_forest"
        ));
    }

    #[test]
    fn empty_after_filter_is_insufficient() {
        let reject_all = |_: &Transaction| false;
        let result = predict_price(
            &three_sales(),
            &one_school(),
            &request(),
            &config("poisson"),
            Some(&reject_all),
        );
        assert!(matches!(
            result,
            Err(PredictError::InsufficientData {
                achieved: 0,
                required: 3
            })
        ));
    }

    #[test]
    fn explicit_threshold_overrides_box() {
        let mut config = config("gaussian");
        config.distance_threshold_km = Some(2.5);
        let prediction =
            predict_price(&three_sales(), &one_school(), &request(), &config, None).unwrap();
        assert!((prediction.distance_threshold_km - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn features_at_describes_one_location() {
        let features = features_at(&one_school(), CENTER, &config("poisson")).unwrap();

        assert_eq!(features.columns, vec!["school_count", "school_shortest_distance"]);
        assert_eq!(features.values.len(), 2);
        assert!((features.values[0] - 1.0).abs() < f64::EPSILON);
        assert!(features.values[1].abs() < 1e-12);
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Feature category definitions.
//!
//! A [`FeatureSpec`] names a category of points of interest (e.g.
//! `school`), the OSM-style tags used to fetch its geometries, and the
//! [`AggregationMethod`]s that turn those geometries into numeric
//! features. Specs are declared in configuration and never mutated while
//! a prediction runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// How the POIs of one category are reduced to a single number per
/// location.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AggregationMethod {
    /// Number of POIs within the distance threshold.
    Count,
    /// Mean distance to the POIs within the distance threshold.
    AverageDistance,
    /// Distance to the closest POI, capped at the threshold.
    ShortestDistance,
}

impl AggregationMethod {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Count, Self::AverageDistance, Self::ShortestDistance]
    }
}

/// Filter applied to one tag key.
///
/// Deserializes from `true`/`false`, a single string, or a list of
/// strings, mirroring how OSM tag queries are usually written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagFilter {
    /// `true` matches any value for the key; `false` requires the key to
    /// be absent.
    Present(bool),
    /// Matches exactly this value.
    Value(String),
    /// Matches any of these values.
    AnyOf(Vec<String>),
}

impl TagFilter {
    /// Whether a tag with value `value` (or `None` when the key is missing)
    /// satisfies the filter.
    #[must_use]
    pub fn matches(&self, value: Option<&str>) -> bool {
        match self {
            Self::Present(required) => value.is_some() == *required,
            Self::Value(expected) => value == Some(expected.as_str()),
            Self::AnyOf(expected) => value.is_some_and(|v| expected.iter().any(|e| e == v)),
        }
    }
}

/// A named POI category and the features derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Category name, used as the column prefix (e.g. `"school"`).
    pub name: String,
    /// Tag filters selecting the category's geometries. All filters must
    /// match.
    #[serde(default)]
    pub tags: BTreeMap<String, TagFilter>,
    /// Aggregations to compute for this category.
    pub methods: Vec<AggregationMethod>,
}

impl FeatureSpec {
    /// Whether a geometry carrying `tags` belongs to this category.
    ///
    /// A spec with no tag filters matches nothing.
    #[must_use]
    pub fn matches_tags<'a>(&self, mut lookup: impl FnMut(&str) -> Option<&'a str>) -> bool {
        !self.tags.is_empty()
            && self
                .tags
                .iter()
                .all(|(key, filter)| filter.matches(lookup(key)))
    }

    /// Column name for one of this category's methods.
    #[must_use]
    pub fn column_name(&self, method: AggregationMethod) -> String {
        column_name(&self.name, method)
    }

    /// Column names for every method, in declaration order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.methods.iter().map(|m| self.column_name(*m)).collect()
    }
}

/// Deterministic column identifier for a (category, method) pair.
#[must_use]
pub fn column_name(category: &str, method: AggregationMethod) -> String {
    format!("{category}_{method}")
}

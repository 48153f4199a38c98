#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Transaction and POI source traits.
//!
//! The prediction pipeline never talks to a database or a map service
//! directly. It queries a [`TransactionSource`] for comparable sales and a
//! [`PoiSource`] for points of interest, both scoped by a bounding box.
//! This crate defines those traits plus implementations backed by
//! in-memory data ([`memory`]), Price Paid style CSV files
//! ([`csv_transactions`]) and `GeoJSON` feature collections
//! ([`geojson_pois`]).

pub mod csv_transactions;
pub mod geojson_pois;
pub mod memory;
pub mod progress;

use house_price_features_models::FeatureSpec;
use house_price_property_models::{BoundingBox, DateRange, PropertyType, Transaction};

pub use csv_transactions::CsvTransactionSource;
pub use geojson_pois::GeoJsonPoiSource;
pub use memory::{InMemoryPoiSource, InMemoryTransactionSource, TaggedGeometry};

/// Errors that can occur while reading from a source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// CSV parsing failed.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path to the CSV file.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// I/O error reading a file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// `GeoJSON` parsing failed.
    #[error("GeoJSON error in {path}: {source}")]
    GeoJson {
        /// Path to the `GeoJSON` file.
        path: String,
        /// Underlying `GeoJSON` error.
        source: Box<geojson::Error>,
    },

    /// The data parsed but did not have the expected shape.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of what went wrong.
        message: String,
    },
}

/// Supplies candidate transactions for the adaptive sampler.
pub trait TransactionSource {
    /// Returns every transaction inside `bbox` whose transfer date falls in
    /// `dates`. `property_type` of `None` means no property type filter.
    ///
    /// Must accept arbitrarily large boxes.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the backing store cannot be queried.
    fn query(
        &self,
        bbox: &BoundingBox,
        dates: &DateRange,
        property_type: Option<PropertyType>,
    ) -> Result<Vec<Transaction>, SourceError>;
}

/// Supplies POI geometries for one feature category.
pub trait PoiSource {
    /// Returns the geometries inside `bbox` matching the tags of `spec`.
    ///
    /// An empty result is valid and not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the backing store cannot be queried.
    fn query(
        &self,
        bbox: &BoundingBox,
        spec: &FeatureSpec,
    ) -> Result<Vec<geo::Geometry<f64>>, SourceError>;
}

//! POIs loaded from a `GeoJSON` `FeatureCollection`.
//!
//! Feature properties are used as tags, so an OSM export where each
//! feature carries properties such as `"amenity": "school"` works as is.
//! Non-string property values (numbers, booleans) are stringified;
//! `null`, arrays and objects are ignored.

use std::collections::BTreeMap;
use std::path::Path;

use geojson::GeoJson;
use house_price_features_models::FeatureSpec;
use house_price_property_models::BoundingBox;

use crate::memory::{InMemoryPoiSource, TaggedGeometry};
use crate::{PoiSource, SourceError};

/// A [`PoiSource`] loaded once from a `GeoJSON` file.
#[derive(Debug, Clone)]
pub struct GeoJsonPoiSource {
    inner: InMemoryPoiSource,
}

impl GeoJsonPoiSource {
    /// Loads every feature with a geometry from the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the file cannot be read or is not a
    /// `GeoJSON` feature or feature collection.
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let text = std::fs::read_to_string(path).map_err(|e| SourceError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let source = Self::parse(&text, &path.display().to_string())?;
        log::info!(
            "Loaded {} POI geometries from {}",
            source.inner.len(),
            path.display()
        );
        Ok(source)
    }

    /// Parses `GeoJSON` text. `label` names the input in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the text is not a `GeoJSON` feature or
    /// feature collection.
    pub fn parse(text: &str, label: &str) -> Result<Self, SourceError> {
        let geojson: GeoJson = text.parse().map_err(|e| SourceError::GeoJson {
            path: label.to_string(),
            source: Box::new(e),
        })?;

        let features = match geojson {
            GeoJson::FeatureCollection(fc) => fc.features,
            GeoJson::Feature(feature) => vec![feature],
            GeoJson::Geometry(_) => {
                return Err(SourceError::Parse {
                    message: format!("{label}: expected a Feature or FeatureCollection"),
                });
            }
        };

        let mut pois = Vec::with_capacity(features.len());
        let mut skipped = 0u64;

        for feature in features {
            let Some(geometry) = feature.geometry else {
                skipped += 1;
                continue;
            };
            let geometry: geo::Geometry<f64> = match geometry.try_into() {
                Ok(g) => g,
                Err(e) => {
                    log::trace!("  skipping unconvertible geometry: {e}");
                    skipped += 1;
                    continue;
                }
            };

            pois.push(TaggedGeometry {
                tags: feature.properties.map(properties_to_tags).unwrap_or_default(),
                geometry,
            });
        }

        if skipped > 0 {
            log::warn!("Skipped {skipped} features without a usable geometry in {label}");
        }

        Ok(Self {
            inner: InMemoryPoiSource::new(pois),
        })
    }
}

impl PoiSource for GeoJsonPoiSource {
    fn query(
        &self,
        bbox: &BoundingBox,
        spec: &FeatureSpec,
    ) -> Result<Vec<geo::Geometry<f64>>, SourceError> {
        self.inner.query(bbox, spec)
    }
}

fn properties_to_tags(properties: geojson::JsonObject) -> BTreeMap<String, String> {
    properties
        .into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Null
                | serde_json::Value::Array(_)
                | serde_json::Value::Object(_) => return None,
            };
            Some((key, value))
        })
        .collect()
}

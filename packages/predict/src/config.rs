//! Prediction configuration.
//!
//! A [`PredictionConfig`] is built once (from the embedded default, a TOML
//! file, or code) and passed by reference into every prediction. Nothing
//! in the pipeline reads configuration from anywhere else.

use std::collections::BTreeSet;
use std::path::Path;

use house_price_features_models::{AggregationMethod, FeatureSpec};
use serde::{Deserialize, Serialize};

/// Embedded default configuration.
const DEFAULT_CONFIG_TOML: &str = include_str!("../config/default.toml");

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Growth factor must be finite and strictly greater than 1.
    #[error("Invalid growth factor {growth_factor}: must be > 1")]
    InvalidGrowthFactor {
        /// The rejected growth factor.
        growth_factor: f64,
    },

    /// Bounding box sizes must be finite and strictly positive.
    #[error("Invalid initial bbox size {initial_bbox_size}: must be > 0")]
    InvalidBboxSize {
        /// The rejected size.
        initial_bbox_size: f64,
    },

    /// The size ceiling is below the starting size.
    #[error("Bbox size limit {limit} is below the initial size {initial}")]
    LimitBelowInitial {
        /// The configured ceiling.
        limit: f64,
        /// The configured starting size.
        initial: f64,
    },

    /// At least one transaction must be required.
    #[error("Required sample size must be at least 1")]
    ZeroRequiredSampleSize,

    /// Explicit distance thresholds must be finite and strictly positive.
    #[error("Invalid distance threshold {threshold_km} km: must be > 0")]
    InvalidThreshold {
        /// The rejected threshold.
        threshold_km: f64,
    },

    /// Two feature specs share a name, which would duplicate columns.
    #[error("Duplicate feature category: {0}")]
    DuplicateFeature(String),

    /// A feature spec lists the same method twice.
    #[error("Feature '{feature}' lists method {method} more than once")]
    DuplicateMethod {
        /// Category name.
        feature: String,
        /// The repeated method.
        method: AggregationMethod,
    },

    /// I/O error reading a configuration file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("Failed to parse configuration {path}: {source}")]
    Toml {
        /// Path (or label) of the configuration.
        path: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
}

/// Parameters of the adaptive sample collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Side length of the first query box, in degrees.
    pub initial_bbox_size: f64,
    /// Multiplier applied to the box size after each short query.
    pub growth_factor: f64,
    /// Largest box size that will be queried, in degrees.
    pub bbox_size_limit: f64,
    /// Number of transactions needed to stop growing.
    pub required_sample_size: usize,
    /// Days on either side of the target date to include.
    pub date_half_window_days: u64,
    /// Whether a non-empty sample below `required_sample_size` is used
    /// after the property type fallback, or rejected.
    pub allow_shortfall: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            initial_bbox_size: 0.01,
            growth_factor: 2.0,
            bbox_size_limit: 0.32,
            required_sample_size: 30,
            date_half_window_days: 365,
            allow_shortfall: true,
        }
    }
}

impl SamplerConfig {
    /// Checks every sampler parameter.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.initial_bbox_size.is_finite() || self.initial_bbox_size <= 0.0 {
            return Err(ConfigError::InvalidBboxSize {
                initial_bbox_size: self.initial_bbox_size,
            });
        }
        if !self.growth_factor.is_finite() || self.growth_factor <= 1.0 {
            return Err(ConfigError::InvalidGrowthFactor {
                growth_factor: self.growth_factor,
            });
        }
        if !self.bbox_size_limit.is_finite() || self.bbox_size_limit < self.initial_bbox_size {
            return Err(ConfigError::LimitBelowInitial {
                limit: self.bbox_size_limit,
                initial: self.initial_bbox_size,
            });
        }
        if self.required_sample_size == 0 {
            return Err(ConfigError::ZeroRequiredSampleSize);
        }
        Ok(())
    }

    /// Upper bound on the number of growing queries:
    /// `ceil(log_growth(limit / initial)) + 1`.
    ///
    /// Only meaningful for a configuration that passed [`Self::validate`].
    #[must_use]
    pub fn max_growth_queries(&self) -> usize {
        let steps = (self.bbox_size_limit / self.initial_bbox_size).ln() / self.growth_factor.ln();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let steps = (steps - 1e-9).max(0.0).ceil() as usize;
        steps + 1
    }
}

/// Everything a prediction needs besides the request itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionConfig {
    /// Regression family name (`"poisson"` or `"gaussian"`).
    #[serde(default = "default_model")]
    pub model: String,
    /// Whether evaluation runs validation records in parallel.
    #[serde(default)]
    pub parallel: bool,
    /// Fixed POI distance threshold in kilometres. When absent, half the
    /// realized sampling box is used.
    #[serde(default)]
    pub distance_threshold_km: Option<f64>,
    /// Adaptive sampler parameters.
    #[serde(default)]
    pub sampler: SamplerConfig,
    /// POI feature categories.
    #[serde(default)]
    pub features: Vec<FeatureSpec>,
}

fn default_model() -> String {
    "poisson".to_string()
}

impl PredictionConfig {
    /// Parses the embedded default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] if the embedded file is malformed.
    pub fn embedded_default() -> Result<Self, ConfigError> {
        Self::from_toml_str(DEFAULT_CONFIG_TOML, "embedded default")
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&text, &path.display().to_string())
    }

    /// Parses TOML text. `label` names the input in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] if the text is not a valid
    /// configuration.
    pub fn from_toml_str(text: &str, label: &str) -> Result<Self, ConfigError> {
        toml::de::from_str(text).map_err(|e| ConfigError::Toml {
            path: label.to_string(),
            source: e,
        })
    }

    /// Checks sampler parameters, the explicit threshold, feature names and
    /// the methods of each feature.
    ///
    /// The model name is checked separately when a prediction starts.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sampler.validate()?;

        if let Some(threshold_km) = self.distance_threshold_km {
            if !threshold_km.is_finite() || threshold_km <= 0.0 {
                return Err(ConfigError::InvalidThreshold { threshold_km });
            }
        }

        let mut seen = BTreeSet::new();
        for spec in &self.features {
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigError::DuplicateFeature(spec.name.clone()));
            }

            let mut methods = BTreeSet::new();
            for method in &spec.methods {
                if !methods.insert(*method) {
                    return Err(ConfigError::DuplicateMethod {
                        feature: spec.name.clone(),
                        method: *method,
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_default_is_valid() {
        let config = PredictionConfig::embedded_default().unwrap();
        config.validate().unwrap();
        assert_eq!(config.model, "poisson");
        assert!(!config.features.is_empty());
        assert_eq!(config.features[0].name, "school");
        assert_eq!(
            config.features[0].methods,
            vec![AggregationMethod::Count, AggregationMethod::ShortestDistance]
        );
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config = PredictionConfig::from_toml_str("model = \"gaussian\"", "inline").unwrap();
        assert_eq!(config.model, "gaussian");
        assert_eq!(config.sampler, SamplerConfig::default());
        assert!(config.features.is_empty());
        assert_eq!(config.distance_threshold_km, None);
    }

    #[test]
    fn rejects_non_growing_factor() {
        for growth_factor in [1.0, 0.5, 0.0, -2.0, f64::NAN] {
            let config = SamplerConfig {
                growth_factor,
                ..SamplerConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidGrowthFactor { .. })
            ));
        }
    }

    #[test]
    fn rejects_bad_sizes_and_sample() {
        let below = SamplerConfig {
            initial_bbox_size: 0.1,
            bbox_size_limit: 0.05,
            ..SamplerConfig::default()
        };
        assert!(matches!(
            below.validate(),
            Err(ConfigError::LimitBelowInitial { .. })
        ));

        let zero_size = SamplerConfig {
            initial_bbox_size: 0.0,
            ..SamplerConfig::default()
        };
        assert!(matches!(
            zero_size.validate(),
            Err(ConfigError::InvalidBboxSize { .. })
        ));

        let zero_sample = SamplerConfig {
            required_sample_size: 0,
            ..SamplerConfig::default()
        };
        assert!(matches!(
            zero_sample.validate(),
            Err(ConfigError::ZeroRequiredSampleSize)
        ));
    }

    #[test]
    fn rejects_bad_threshold_and_duplicate_features() {
        let mut config = PredictionConfig::embedded_default().unwrap();
        config.distance_threshold_km = Some(0.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreshold { .. })
        ));

        let mut config = PredictionConfig::embedded_default().unwrap();
        let first = config.features[0].clone();
        config.features.push(first);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateFeature(name)) if name == "school"
        ));
    }

    #[test]
    fn rejects_repeated_method_within_feature() {
        let config = PredictionConfig::from_toml_str(
            r#"
            [[features]]
            name = "school"
            tags = { amenity = "school" }
            methods = ["count", "shortest_distance", "count"]
            "#,
            "inline",
        )
        .unwrap();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateMethod { feature, method: AggregationMethod::Count })
                if feature == "school"
        ));
    }

    #[test]
    fn growth_query_bound() {
        let config = SamplerConfig {
            initial_bbox_size: 0.01,
            growth_factor: 2.0,
            bbox_size_limit: 0.32,
            ..SamplerConfig::default()
        };
        assert_eq!(config.max_growth_queries(), 6);

        let flat = SamplerConfig {
            initial_bbox_size: 0.1,
            bbox_size_limit: 0.1,
            ..SamplerConfig::default()
        };
        assert_eq!(flat.max_growth_queries(), 1);
    }
}

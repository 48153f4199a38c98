#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! House price prediction from nearby comparable sales.
//!
//! A prediction grows a sampling box around the target location until
//! enough recent transactions are found ([`sampler`]), describes each of
//! them and the target by their proximity to points of interest, fits a
//! generalized linear model of price on those features ([`glm`]) and
//! evaluates the model at the target ([`engine`]). The [`evaluate`]
//! module runs that pipeline leave-one-out over a validation set.

pub mod config;
pub mod engine;
pub mod evaluate;
pub mod glm;
pub mod sampler;

use house_price_features::FeatureError;
use house_price_source::SourceError;
use thiserror::Error;

pub use config::{ConfigError, PredictionConfig, SamplerConfig};
pub use engine::{LocationFeatures, Prediction, PredictionRequest, features_at, predict_price};
pub use evaluate::{Evaluation, EvaluationFailure, EvaluationMetrics, evaluate, evaluate_parallel};
pub use glm::{GlmError, GlmFit, ModelFamily};
pub use sampler::{SampleOutcome, SamplerState, collect_sample};

/// Errors that can occur while producing a prediction.
#[derive(Debug, Error)]
pub enum PredictError {
    /// Too few transactions were found to fit a model.
    #[error("Insufficient data: found {achieved} transactions, {required} required")]
    InsufficientData {
        /// Number of usable transactions.
        achieved: usize,
        /// Configured required sample size.
        required: usize,
    },

    /// The configured model family is not supported.
    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A transaction or POI source failed.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Feature computation failed.
    #[error("Feature error: {0}")]
    Feature(#[from] FeatureError),

    /// Model fitting or evaluation failed.
    #[error("Fit error: {0}")]
    Fit(#[from] GlmError),
}

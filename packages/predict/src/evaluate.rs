//! Leave-one-out evaluation over a validation set.
//!
//! Each validation record is predicted at its own location, date and
//! property type, with the record itself excluded from training by its
//! `unique_id`. A record that cannot be predicted is reported in
//! [`Evaluation::failures`] and does not stop the batch; only an invalid
//! configuration or model name aborts it.

use house_price_property_models::Transaction;
use house_price_source::progress::ProgressCallback;
use house_price_source::{PoiSource, TransactionSource};
use rayon::prelude::*;
use serde::Serialize;

use crate::PredictError;
use crate::config::PredictionConfig;
use crate::engine::{PredictionRequest, predict_price, resolve_model};

/// A validation record that could not be predicted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationFailure {
    /// Position of the record in the validation input.
    pub index: usize,
    /// Identifier of the record.
    pub unique_id: String,
    /// Why the prediction failed.
    pub message: String,
}

/// Actual and predicted prices, aligned with the validation input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    /// Actual sale prices.
    pub actual: Vec<u64>,
    /// Predicted prices; `None` where the record failed.
    pub predicted: Vec<Option<f64>>,
    /// Records that could not be predicted.
    pub failures: Vec<EvaluationFailure>,
}

/// Error summary over the successfully predicted records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvaluationMetrics {
    /// Number of predicted records.
    pub count: usize,
    /// Root mean squared error.
    pub rmse: f64,
    /// Mean absolute error.
    pub mae: f64,
    /// Mean absolute percentage error, over records with a non-zero
    /// actual price.
    pub mape: f64,
}

impl Evaluation {
    fn from_results(validation: &[Transaction], results: Vec<Result<f64, PredictError>>) -> Self {
        let mut predicted = Vec::with_capacity(results.len());
        let mut failures = Vec::new();

        for (index, (record, result)) in validation.iter().zip(results).enumerate() {
            match result {
                Ok(price) => predicted.push(Some(price)),
                Err(e) => {
                    log::warn!("Prediction failed for {}: {e}", record.unique_id);
                    predicted.push(None);
                    failures.push(EvaluationFailure {
                        index,
                        unique_id: record.unique_id.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        Self {
            actual: validation.iter().map(|t| t.price).collect(),
            predicted,
            failures,
        }
    }

    /// Error metrics over the records that were predicted, or `None` if
    /// none were.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn metrics(&self) -> Option<EvaluationMetrics> {
        let pairs: Vec<(f64, f64)> = self
            .actual
            .iter()
            .zip(&self.predicted)
            .filter_map(|(actual, predicted)| predicted.map(|p| (*actual as f64, p)))
            .collect();
        if pairs.is_empty() {
            return None;
        }

        let n = pairs.len() as f64;
        let squared = pairs.iter().map(|(a, p)| (a - p).powi(2)).sum::<f64>();
        let absolute = pairs.iter().map(|(a, p)| (a - p).abs()).sum::<f64>();

        let percentages: Vec<f64> = pairs
            .iter()
            .filter(|(a, _)| *a > 0.0)
            .map(|(a, p)| (a - p).abs() / a)
            .collect();
        let mape = if percentages.is_empty() {
            0.0
        } else {
            percentages.iter().sum::<f64>() / percentages.len() as f64
        };

        Some(EvaluationMetrics {
            count: pairs.len(),
            rmse: (squared / n).sqrt(),
            mae: absolute / n,
            mape,
        })
    }
}

fn predict_record<T, P>(
    transactions: &T,
    pois: &P,
    record: &Transaction,
    config: &PredictionConfig,
) -> Result<f64, PredictError>
where
    T: TransactionSource + ?Sized,
    P: PoiSource + ?Sized,
{
    let request = PredictionRequest {
        center: record.coordinate(),
        date: record.date_of_transfer,
        property_type: Some(record.property_type),
    };
    let exclude_self = |t: &Transaction| t.unique_id != record.unique_id;
    predict_price(transactions, pois, &request, config, Some(&exclude_self)).map(|p| p.price)
}

/// Runs a leave-one-out prediction for every validation record in order.
///
/// # Errors
///
/// Returns [`PredictError::Config`] or [`PredictError::UnsupportedModel`]
/// if the configuration cannot produce any prediction. Per-record errors
/// are collected in [`Evaluation::failures`].
pub fn evaluate<T, P>(
    transactions: &T,
    pois: &P,
    validation: &[Transaction],
    config: &PredictionConfig,
    progress: &dyn ProgressCallback,
) -> Result<Evaluation, PredictError>
where
    T: TransactionSource + ?Sized,
    P: PoiSource + ?Sized,
{
    config.validate()?;
    resolve_model(config)?;

    progress.set_total(validation.len() as u64);
    progress.set_message("Evaluating".to_string());

    let results: Vec<Result<f64, PredictError>> = validation
        .iter()
        .map(|record| {
            let result = predict_record(transactions, pois, record, config);
            progress.inc(1);
            result
        })
        .collect();

    let evaluation = Evaluation::from_results(validation, results);
    progress.finish(format!(
        "Evaluated {} records ({} failed)",
        validation.len(),
        evaluation.failures.len()
    ));
    Ok(evaluation)
}

/// Same as [`evaluate`], with records predicted on the rayon thread pool.
///
/// Results keep the validation order.
///
/// # Errors
///
/// See [`evaluate`].
pub fn evaluate_parallel<T, P>(
    transactions: &T,
    pois: &P,
    validation: &[Transaction],
    config: &PredictionConfig,
    progress: &dyn ProgressCallback,
) -> Result<Evaluation, PredictError>
where
    T: TransactionSource + Sync + ?Sized,
    P: PoiSource + Sync + ?Sized,
{
    config.validate()?;
    resolve_model(config)?;

    progress.set_total(validation.len() as u64);
    progress.set_message(format!(
        "Evaluating on {} threads",
        rayon::current_num_threads()
    ));

    let results: Vec<Result<f64, PredictError>> = validation
        .par_iter()
        .map(|record| {
            let result = predict_record(transactions, pois, record, config);
            progress.inc(1);
            result
        })
        .collect();

    let evaluation = Evaluation::from_results(validation, results);
    progress.finish(format!(
        "Evaluated {} records ({} failed)",
        validation.len(),
        evaluation.failures.len()
    ));
    Ok(evaluation)
}

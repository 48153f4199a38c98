//! Generalized linear models fitted by iteratively reweighted least
//! squares.
//!
//! Two families are supported: [`ModelFamily::Poisson`] with a log link
//! and [`ModelFamily::Gaussian`] with an identity link. Each IRLS step
//! solves the weighted normal equations by Gauss-Jordan elimination with
//! partial pivoting. Columns whose pivot vanishes (constant or duplicated
//! features, which POI counts often are in sparse areas) are treated as
//! aliased and get a coefficient of 0 instead of failing the fit.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Zip};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Iteration cap for the Poisson fit.
const MAX_ITERATIONS: usize = 100;

/// Relative deviance change that counts as converged.
const TOLERANCE: f64 = 1e-8;

/// Linear predictors are capped here so `exp` stays finite.
const MAX_ETA: f64 = 700.0;

/// A pivot at or below this fraction of its column's unreduced diagonal
/// marks the column as aliased.
const ALIAS_TOLERANCE: f64 = 1e-10;

/// Errors from model fitting.
#[derive(Debug, thiserror::Error)]
pub enum GlmError {
    /// The design matrix has no rows or no columns.
    #[error("Design matrix is empty ({rows} x {columns})")]
    EmptyDesign {
        /// Number of rows.
        rows: usize,
        /// Number of columns.
        columns: usize,
    },

    /// Response length does not match the number of design rows.
    #[error("Design has {rows} rows but the response has {responses} values")]
    DimensionMismatch {
        /// Number of design rows.
        rows: usize,
        /// Number of response values.
        responses: usize,
    },

    /// The response cannot be modelled by the requested family.
    #[error("Degenerate response: {message}")]
    DegenerateResponse {
        /// Description of the problem.
        message: String,
    },

    /// Inputs or the fitted result contain NaN or infinite values.
    #[error("Non-finite values encountered in {stage}")]
    NonFinite {
        /// Where the values were found.
        stage: &'static str,
    },
}

/// Regression family and link.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ModelFamily {
    /// Log link, variance equal to the mean.
    Poisson,
    /// Identity link, constant variance (ordinary least squares).
    Gaussian,
}

impl ModelFamily {
    /// Maps a linear predictor to the response scale.
    #[must_use]
    pub fn inverse_link(self, eta: f64) -> f64 {
        match self {
            Self::Poisson => eta.min(MAX_ETA).exp(),
            Self::Gaussian => eta,
        }
    }
}

/// A fitted model.
#[derive(Debug, Clone, PartialEq)]
pub struct GlmFit {
    /// Family the model was fitted with.
    pub family: ModelFamily,
    /// One coefficient per design column. Aliased columns are 0.
    pub coefficients: Array1<f64>,
    /// IRLS iterations performed.
    pub iterations: usize,
    /// Whether the deviance converged before the iteration cap.
    pub converged: bool,
    /// Final deviance.
    pub deviance: f64,
}

impl GlmFit {
    /// Predicted mean response for one design row.
    ///
    /// # Errors
    ///
    /// Returns [`GlmError::DimensionMismatch`] if the row length differs
    /// from the number of coefficients and [`GlmError::NonFinite`] if the
    /// prediction is not finite.
    pub fn predict(&self, row: ArrayView1<'_, f64>) -> Result<f64, GlmError> {
        if row.len() != self.coefficients.len() {
            return Err(GlmError::DimensionMismatch {
                rows: self.coefficients.len(),
                responses: row.len(),
            });
        }
        let value = self.family.inverse_link(row.dot(&self.coefficients));
        if value.is_finite() {
            Ok(value)
        } else {
            Err(GlmError::NonFinite {
                stage: "prediction",
            })
        }
    }
}

/// Prepends a column of ones to `features`.
#[must_use]
pub fn with_intercept(features: ArrayView2<'_, f64>) -> Array2<f64> {
    let (rows, columns) = features.dim();
    let mut design = Array2::ones((rows, columns + 1));
    design.slice_mut(ndarray::s![.., 1..]).assign(&features);
    design
}

/// Fits `family` to `response` given `design`.
///
/// `design` must already contain any intercept column.
///
/// # Errors
///
/// Returns [`GlmError`] if the inputs are empty, mismatched or non-finite,
/// if a Poisson response is negative or all zero, or if the fit diverges.
pub fn fit(
    family: ModelFamily,
    design: ArrayView2<'_, f64>,
    response: ArrayView1<'_, f64>,
) -> Result<GlmFit, GlmError> {
    let (rows, columns) = design.dim();
    if rows == 0 || columns == 0 {
        return Err(GlmError::EmptyDesign { rows, columns });
    }
    if response.len() != rows {
        return Err(GlmError::DimensionMismatch {
            rows,
            responses: response.len(),
        });
    }
    if design.iter().chain(response.iter()).any(|v| !v.is_finite()) {
        return Err(GlmError::NonFinite { stage: "inputs" });
    }

    let fitted = match family {
        ModelFamily::Gaussian => fit_gaussian(design, response),
        ModelFamily::Poisson => fit_poisson(design, response)?,
    };

    if fitted.coefficients.iter().any(|b| !b.is_finite()) || !fitted.deviance.is_finite() {
        return Err(GlmError::NonFinite {
            stage: "coefficients",
        });
    }
    Ok(fitted)
}

fn fit_gaussian(design: ArrayView2<'_, f64>, response: ArrayView1<'_, f64>) -> GlmFit {
    let coefficients = weighted_least_squares(design, response, None);
    let fitted = design.dot(&coefficients);
    let deviance = Zip::from(&response)
        .and(&fitted)
        .fold(0.0, |acc, y, mu| acc + (y - mu).powi(2));

    GlmFit {
        family: ModelFamily::Gaussian,
        coefficients,
        iterations: 1,
        converged: true,
        deviance,
    }
}

fn fit_poisson(
    design: ArrayView2<'_, f64>,
    response: ArrayView1<'_, f64>,
) -> Result<GlmFit, GlmError> {
    if response.iter().any(|y| *y < 0.0) {
        return Err(GlmError::DegenerateResponse {
            message: "poisson response must be non-negative".to_string(),
        });
    }
    let mean = response.mean().unwrap_or(0.0);
    if mean <= 0.0 {
        return Err(GlmError::DegenerateResponse {
            message: "poisson response is all zero".to_string(),
        });
    }

    let mut mu = response.mapv(|y| (y + mean) / 2.0);
    let mut eta = mu.mapv(f64::ln);
    let mut deviance = poisson_deviance(response, mu.view());
    let mut coefficients = Array1::zeros(design.ncols());

    for iteration in 1..=MAX_ITERATIONS {
        let working = Zip::from(&eta)
            .and(&response)
            .and(&mu)
            .map_collect(|e, y, m| e + (y - m) / m);

        coefficients = weighted_least_squares(design, working.view(), Some(mu.view()));
        eta = design.dot(&coefficients).mapv(|e| e.min(MAX_ETA));
        mu = eta.mapv(|e| e.exp().max(f64::MIN_POSITIVE));

        let updated = poisson_deviance(response, mu.view());
        if !updated.is_finite() {
            return Err(GlmError::NonFinite { stage: "deviance" });
        }
        let change = (updated - deviance).abs();
        deviance = updated;

        if change <= TOLERANCE * (deviance.abs() + 0.1) {
            return Ok(GlmFit {
                family: ModelFamily::Poisson,
                coefficients,
                iterations: iteration,
                converged: true,
                deviance,
            });
        }
    }

    log::warn!("Poisson fit did not converge after {MAX_ITERATIONS} iterations");
    Ok(GlmFit {
        family: ModelFamily::Poisson,
        coefficients,
        iterations: MAX_ITERATIONS,
        converged: false,
        deviance,
    })
}

/// Poisson deviance `2 * sum(y * ln(y / mu) - (y - mu))`, with the
/// `y = 0` term reducing to `2 * mu`.
fn poisson_deviance(response: ArrayView1<'_, f64>, mu: ArrayView1<'_, f64>) -> f64 {
    2.0 * Zip::from(&response).and(&mu).fold(0.0, |acc, y, m| {
        let log_term = if *y > 0.0 { y * (y / m).ln() } else { 0.0 };
        acc + log_term - (y - m)
    })
}

/// Solves `(X' W X) b = X' W z`; `weights` of `None` means all ones.
fn weighted_least_squares(
    design: ArrayView2<'_, f64>,
    target: ArrayView1<'_, f64>,
    weights: Option<ArrayView1<'_, f64>>,
) -> Array1<f64> {
    let (rows, columns) = design.dim();
    let mut normal = Array2::<f64>::zeros((columns, columns));
    let mut rhs = Array1::<f64>::zeros(columns);

    for i in 0..rows {
        let w = weights.as_ref().map_or(1.0, |w| w[i]);
        let row = design.row(i);
        for a in 0..columns {
            let weighted = row[a] * w;
            rhs[a] += weighted * target[i];
            for b in a..columns {
                normal[[a, b]] += weighted * row[b];
            }
        }
    }
    for a in 0..columns {
        for b in 0..a {
            normal[[a, b]] = normal[[b, a]];
        }
    }

    solve_aliased(normal, rhs)
}

/// Gauss-Jordan elimination with partial pivoting. Columns without a
/// usable pivot are aliased and solved as 0.
fn solve_aliased(mut a: Array2<f64>, mut b: Array1<f64>) -> Array1<f64> {
    let n = b.len();
    let scale: Vec<f64> = (0..n).map(|j| a[[j, j]].abs()).collect();
    let mut pivots = Vec::with_capacity(n);
    let mut row = 0;

    for col in 0..n {
        if row == n {
            break;
        }

        let mut best = row;
        for r in row + 1..n {
            if a[[r, col]].abs() > a[[best, col]].abs() {
                best = r;
            }
        }
        if a[[best, col]].abs() <= ALIAS_TOLERANCE * scale[col] {
            log::trace!("Design column {col} is aliased, fixing its coefficient at 0");
            continue;
        }

        if best != row {
            for c in 0..n {
                a.swap([best, c], [row, c]);
            }
            b.swap(best, row);
        }

        let pivot = a[[row, col]];
        for r in 0..n {
            if r == row {
                continue;
            }
            let factor = a[[r, col]] / pivot;
            if factor == 0.0 {
                continue;
            }
            for c in col..n {
                let v = a[[row, c]];
                a[[r, c]] -= factor * v;
            }
            let v = b[row];
            b[r] -= factor * v;
        }

        pivots.push((row, col));
        row += 1;
    }

    let mut solution = Array1::zeros(n);
    for (r, c) in pivots {
        solution[c] = b[r] / a[[r, c]];
    }
    solution
}

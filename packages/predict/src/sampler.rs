//! Adaptive sample collector.
//!
//! Grows a square query box around the target until the transaction
//! source returns enough comparable sales, then falls back to dropping
//! the property type filter once the box would exceed its ceiling.
//!
//! The policy lives in [`SamplerState::next`], a pure function of the
//! current state and the size of the last result, so the termination
//! bound and the fallback path can be tested without a source.
//! [`collect_sample`] drives it against a real [`TransactionSource`].

use chrono::NaiveDate;
use house_price_property_models::{Coordinate, DateRange, PropertyType, Transaction};
use house_price_source::TransactionSource;
use house_price_spatial::bounding_box;

use crate::PredictError;
use crate::config::SamplerConfig;

/// Where the collector is in its search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplerState {
    /// Querying with the property type filter at `bbox_size`. `iteration`
    /// counts the growing queries already made.
    Growing {
        /// Current box side length in degrees.
        bbox_size: f64,
        /// Zero-based index of the query about to run.
        iteration: usize,
    },
    /// Enough transactions were found.
    Satisfied {
        /// Box side length that produced the sample.
        bbox_size: f64,
    },
    /// The ceiling was reached; one more query without the property type
    /// filter is due.
    ExhaustedFallback {
        /// Last box side length queried.
        bbox_size: f64,
    },
    /// The fallback returned some transactions, but fewer than required.
    Shortfall {
        /// Box side length of the fallback query.
        bbox_size: f64,
        /// Number of transactions found.
        achieved: usize,
    },
    /// The fallback returned nothing.
    ExhaustedEmpty {
        /// Box side length of the fallback query.
        bbox_size: f64,
    },
}

impl SamplerState {
    /// The starting state for `config`.
    #[must_use]
    pub const fn start(config: &SamplerConfig) -> Self {
        Self::Growing {
            bbox_size: config.initial_bbox_size,
            iteration: 0,
        }
    }

    /// Box size associated with the state.
    #[must_use]
    pub const fn bbox_size(&self) -> f64 {
        match self {
            Self::Growing { bbox_size, .. }
            | Self::Satisfied { bbox_size }
            | Self::ExhaustedFallback { bbox_size }
            | Self::Shortfall { bbox_size, .. }
            | Self::ExhaustedEmpty { bbox_size } => *bbox_size,
        }
    }

    /// Whether no further query is needed.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Satisfied { .. } | Self::Shortfall { .. } | Self::ExhaustedEmpty { .. }
        )
    }

    /// Transition after a query in this state returned `found` records.
    ///
    /// Terminal states are returned unchanged. The box never shrinks and
    /// a growing state never outlives
    /// [`SamplerConfig::max_growth_queries`] queries.
    #[must_use]
    pub fn next(self, found: usize, config: &SamplerConfig) -> Self {
        let required = config.required_sample_size;

        match self {
            Self::Growing {
                bbox_size,
                iteration,
            } => {
                if found >= required {
                    return Self::Satisfied { bbox_size };
                }
                let grown = bbox_size * config.growth_factor;
                if grown > config.bbox_size_limit
                    || iteration + 1 >= config.max_growth_queries()
                {
                    Self::ExhaustedFallback { bbox_size }
                } else {
                    Self::Growing {
                        bbox_size: grown,
                        iteration: iteration + 1,
                    }
                }
            }
            Self::ExhaustedFallback { bbox_size } => {
                if found >= required {
                    Self::Satisfied { bbox_size }
                } else if found == 0 {
                    Self::ExhaustedEmpty { bbox_size }
                } else {
                    Self::Shortfall {
                        bbox_size,
                        achieved: found,
                    }
                }
            }
            terminal => terminal,
        }
    }
}

/// The transactions gathered for one prediction.
#[derive(Debug, Clone)]
pub struct SampleOutcome {
    /// The sampled transactions.
    pub transactions: Vec<Transaction>,
    /// Realized box side length in degrees.
    pub bbox_size: f64,
    /// Number of source queries made.
    pub queries: usize,
    /// Whether the property type filter was dropped.
    pub fallback_used: bool,
    /// Number of transactions found when below the required size.
    pub shortfall: Option<usize>,
}

/// Collects comparable transactions around `center`.
///
/// # Errors
///
/// * [`PredictError::Config`] if `config` is invalid.
/// * [`PredictError::Source`] if a query fails.
/// * [`PredictError::InsufficientData`] if nothing was found even after
///   the fallback, or if a shortfall is not allowed.
pub fn collect_sample<S: TransactionSource + ?Sized>(
    source: &S,
    center: Coordinate,
    date: NaiveDate,
    property_type: Option<PropertyType>,
    config: &SamplerConfig,
) -> Result<SampleOutcome, PredictError> {
    config.validate()?;

    let dates = DateRange::around(date, config.date_half_window_days);
    log::info!(
        "Considering time range: {} to {}",
        dates.start,
        dates.end
    );

    let mut state = SamplerState::start(config);
    let mut transactions = Vec::new();
    let mut queries = 0usize;
    let mut fallback_used = false;

    while !state.is_terminal() {
        match state {
            SamplerState::Growing { bbox_size, .. } => {
                let bbox = bounding_box(center, bbox_size, bbox_size);
                transactions = source.query(&bbox, &dates, property_type)?;
                queries += 1;
                log::debug!(
                    "Found {} transactions with bbox size = {bbox_size}",
                    transactions.len()
                );
            }
            SamplerState::ExhaustedFallback { bbox_size } => {
                if let Some(ty) = property_type {
                    log::warn!(
                        "The number of {} samples is {}, which is less than the requirement {}. \
                         Considering properties of all types.",
                        ty.label(),
                        transactions.len(),
                        config.required_sample_size
                    );
                    let bbox = bounding_box(center, bbox_size, bbox_size);
                    transactions = source.query(&bbox, &dates, None)?;
                    queries += 1;
                    fallback_used = true;
                }
            }
            SamplerState::Satisfied { .. }
            | SamplerState::Shortfall { .. }
            | SamplerState::ExhaustedEmpty { .. } => {}
        }
        state = state.next(transactions.len(), config);
    }

    let bbox_size = state.bbox_size();
    log::info!(
        "Retrieved {} transactions with bbox size = {bbox_size}",
        transactions.len()
    );

    let shortfall = match state {
        SamplerState::ExhaustedEmpty { .. } => {
            return Err(PredictError::InsufficientData {
                achieved: 0,
                required: config.required_sample_size,
            });
        }
        SamplerState::Shortfall { achieved, .. } => {
            if !config.allow_shortfall {
                return Err(PredictError::InsufficientData {
                    achieved,
                    required: config.required_sample_size,
                });
            }
            log::warn!(
                "Only {achieved} of {} required transactions found; prediction may be inaccurate",
                config.required_sample_size
            );
            Some(achieved)
        }
        _ => None,
    };

    Ok(SampleOutcome {
        transactions,
        bbox_size,
        queries,
        fallback_used,
        shortfall,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use house_price_property_models::BoundingBox;
    use house_price_source::{InMemoryTransactionSource, SourceError};

    use super::*;

    const CENTER: Coordinate = Coordinate::new(51.5, -0.1);

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
    }

    fn transaction(id: usize, lat: f64, lon: f64, ty: PropertyType) -> Transaction {
        Transaction {
            unique_id: format!("t{id}"),
            price: 100 * (id as u64 + 1),
            date_of_transfer: date(),
            property_type: ty,
            latitude: lat,
            longitude: lon,
            postcode: None,
        }
    }

    /// Records every query it receives.
    struct RecordingSource {
        inner: InMemoryTransactionSource,
        calls: RefCell<Vec<(f64, Option<PropertyType>)>>,
    }

    impl RecordingSource {
        fn new(transactions: Vec<Transaction>) -> Self {
            Self {
                inner: InMemoryTransactionSource::new(transactions),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl TransactionSource for RecordingSource {
        fn query(
            &self,
            bbox: &BoundingBox,
            dates: &DateRange,
            property_type: Option<PropertyType>,
        ) -> Result<Vec<Transaction>, SourceError> {
            self.calls.borrow_mut().push((bbox.width(), property_type));
            self.inner.query(bbox, dates, property_type)
        }
    }

    fn config(required: usize) -> SamplerConfig {
        SamplerConfig {
            initial_bbox_size: 0.01,
            growth_factor: 2.0,
            bbox_size_limit: 0.08,
            required_sample_size: required,
            date_half_window_days: 30,
            allow_shortfall: true,
        }
    }

    #[test]
    fn satisfied_on_first_query_without_growing() {
        let source = RecordingSource::new(vec![
            transaction(0, 51.501, -0.101, PropertyType::Flat),
            transaction(1, 51.499, -0.099, PropertyType::Flat),
            transaction(2, 51.5, -0.1, PropertyType::Flat),
        ]);

        let outcome = collect_sample(&source, CENTER, date(), None, &config(3)).unwrap();

        assert_eq!(outcome.transactions.len(), 3);
        assert_eq!(outcome.queries, 1);
        assert!((outcome.bbox_size - 0.01).abs() < f64::EPSILON);
        assert!(!outcome.fallback_used);
        assert_eq!(outcome.shortfall, None);
    }

    #[test]
    fn grows_until_enough_transactions() {
        // Distance from center of 0.015 degrees needs a box of at least 0.03.
        let source = RecordingSource::new(vec![
            transaction(0, 51.5, -0.1, PropertyType::Detached),
            transaction(1, 51.515, -0.1, PropertyType::Detached),
        ]);

        let outcome = collect_sample(&source, CENTER, date(), None, &config(2)).unwrap();

        assert_eq!(outcome.transactions.len(), 2);
        assert!((outcome.bbox_size - 0.04).abs() < 1e-12);
        let sizes: Vec<f64> = source.calls.borrow().iter().map(|(s, _)| *s).collect();
        assert_eq!(sizes.len(), 3);
        assert!(sizes.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn falls_back_to_all_property_types_once() {
        let source = RecordingSource::new(vec![
            transaction(0, 51.5, -0.1, PropertyType::Flat),
            transaction(1, 51.5, -0.1, PropertyType::Terraced),
        ]);

        let outcome = collect_sample(
            &source,
            CENTER,
            date(),
            Some(PropertyType::Flat),
            &config(5),
        )
        .unwrap();

        let calls = source.calls.borrow();
        // 0.01, 0.02, 0.04, 0.08 with the filter, then one unfiltered retry.
        assert_eq!(calls.len(), 5);
        assert!(calls[..4].iter().all(|(_, ty)| *ty == Some(PropertyType::Flat)));
        assert_eq!(calls[4].1, None);
        assert!((calls[4].0 - 0.08).abs() < 1e-12);
        drop(calls);

        assert!(outcome.fallback_used);
        assert_eq!(outcome.transactions.len(), 2);
        assert_eq!(outcome.shortfall, Some(2));
    }

    #[test]
    fn shortfall_rejected_when_not_allowed() {
        let source = RecordingSource::new(vec![transaction(0, 51.5, -0.1, PropertyType::Terraced)]);
        let strict = SamplerConfig {
            allow_shortfall: false,
            ..config(3)
        };

        let err = collect_sample(&source, CENTER, date(), Some(PropertyType::Flat), &strict)
            .unwrap_err();

        assert!(matches!(
            err,
            PredictError::InsufficientData {
                achieved: 1,
                required: 3
            }
        ));
        assert_eq!(source.calls.borrow().last().unwrap().1, None);
    }

    #[test]
    fn no_extra_query_without_property_type() {
        let source = RecordingSource::new(vec![transaction(0, 51.5, -0.1, PropertyType::Flat)]);

        let outcome = collect_sample(&source, CENTER, date(), None, &config(2)).unwrap();

        assert_eq!(source.calls.borrow().len(), 4);
        assert!(!outcome.fallback_used);
        assert_eq!(outcome.shortfall, Some(1));
    }

    #[test]
    fn empty_after_fallback_is_insufficient_data() {
        let source = RecordingSource::new(vec![]);

        let err = collect_sample(&source, CENTER, date(), Some(PropertyType::Flat), &config(1))
            .unwrap_err();

        assert!(matches!(
            err,
            PredictError::InsufficientData {
                achieved: 0,
                required: 1
            }
        ));
    }

    #[test]
    fn rejects_growth_factor_at_or_below_one() {
        let source = RecordingSource::new(vec![]);
        let bad = SamplerConfig {
            growth_factor: 1.0,
            ..config(1)
        };

        assert!(matches!(
            collect_sample(&source, CENTER, date(), None, &bad),
            Err(PredictError::Config(_))
        ));
        assert!(source.calls.borrow().is_empty());
    }

    #[test]
    fn state_machine_terminates_within_bound() {
        for growth_factor in [1.01, 1.1, 1.5, 2.0, 3.0, 10.0] {
            for (initial, limit) in [(0.001, 0.5), (0.01, 0.01), (0.05, 0.051), (0.1, 10.0)] {
                let config = SamplerConfig {
                    initial_bbox_size: initial,
                    growth_factor,
                    bbox_size_limit: limit,
                    required_sample_size: usize::MAX,
                    date_half_window_days: 0,
                    allow_shortfall: true,
                };
                let bound = config.max_growth_queries();

                let mut state = SamplerState::start(&config);
                let mut growing_queries = 0;
                let mut last_size = state.bbox_size();
                while let SamplerState::Growing { .. } = state {
                    growing_queries += 1;
                    state = state.next(0, &config);
                    assert!(state.bbox_size() >= last_size);
                    assert!(state.bbox_size() <= limit);
                    last_size = state.bbox_size();
                }

                assert!(
                    growing_queries <= bound,
                    "growth {growth_factor}, {initial}..{limit}: {growing_queries} > {bound}"
                );
                assert!(matches!(state, SamplerState::ExhaustedFallback { .. }));
                assert_eq!(state.next(0, &config), SamplerState::ExhaustedEmpty {
                    bbox_size: last_size
                });
            }
        }
    }
}

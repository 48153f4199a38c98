//! Transactions loaded from a CSV file.
//!
//! Expects a header row with the columns `unique_id`, `price`,
//! `date_of_transfer` (`YYYY-MM-DD`), `property_type` (`D`, `S`, `T`, `F`
//! or `O`), `latitude`, `longitude` and an optional `postcode`. This is
//! the Price Paid data already joined with postcode coordinates.

use std::io::Read;
use std::path::Path;

use house_price_property_models::{BoundingBox, DateRange, PropertyType, Transaction};

use crate::memory::InMemoryTransactionSource;
use crate::{SourceError, TransactionSource};

/// A [`TransactionSource`] loaded once from a CSV file.
#[derive(Debug, Clone)]
pub struct CsvTransactionSource {
    inner: InMemoryTransactionSource,
}

impl CsvTransactionSource {
    /// Loads every well-formed row of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Csv`] if the file cannot be opened or its
    /// header cannot be read.
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let transactions = read_transactions(path)?;
        log::info!(
            "Loaded {} transactions from {}",
            transactions.len(),
            path.display()
        );
        Ok(Self {
            inner: InMemoryTransactionSource::new(transactions),
        })
    }

    /// All loaded transactions.
    #[must_use]
    pub fn transactions(&self) -> &[Transaction] {
        self.inner.transactions()
    }
}

impl TransactionSource for CsvTransactionSource {
    fn query(
        &self,
        bbox: &BoundingBox,
        dates: &DateRange,
        property_type: Option<PropertyType>,
    ) -> Result<Vec<Transaction>, SourceError> {
        self.inner.query(bbox, dates, property_type)
    }
}

/// Reads transactions from the CSV file at `path`.
///
/// Malformed rows are skipped and counted in a warning.
///
/// # Errors
///
/// Returns [`SourceError::Csv`] if the file cannot be opened or its header
/// cannot be read.
pub fn read_transactions(path: &Path) -> Result<Vec<Transaction>, SourceError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| SourceError::Csv {
            path: path.display().to_string(),
            source: e,
        })?;

    collect_rows(reader, &path.display().to_string())
}

/// Reads transactions from any CSV `Read` source.
///
/// # Errors
///
/// Returns [`SourceError::Csv`] if the header cannot be read.
pub fn parse_transactions(reader: impl Read, label: &str) -> Result<Vec<Transaction>, SourceError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    collect_rows(reader, label)
}

fn collect_rows<R: Read>(
    mut reader: csv::Reader<R>,
    label: &str,
) -> Result<Vec<Transaction>, SourceError> {
    reader.headers().map_err(|e| SourceError::Csv {
        path: label.to_string(),
        source: e,
    })?;

    let mut transactions = Vec::new();
    let mut skipped = 0u64;

    for result in reader.deserialize::<Transaction>() {
        match result {
            Ok(t) => transactions.push(t),
            Err(e) => {
                log::trace!("  skipping malformed row: {e}");
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        log::warn!("Skipped {skipped} malformed rows in {label}");
    }

    Ok(transactions)
}

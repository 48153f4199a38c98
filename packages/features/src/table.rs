//! Column-named feature matrix.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis, s};

/// One row per location, one named column per (category, method) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    columns: Vec<String>,
    values: Array2<f64>,
}

impl FeatureTable {
    /// Assembles a table from column-major data.
    ///
    /// Every entry of `values` must hold `n_rows` cells.
    pub(crate) fn from_columns(n_rows: usize, columns: Vec<String>, values: &[Vec<f64>]) -> Self {
        let mut matrix = Array2::zeros((n_rows, columns.len()));
        for (j, column) in values.iter().enumerate() {
            for (i, value) in column.iter().enumerate() {
                matrix[[i, j]] = *value;
            }
        }

        Self {
            columns,
            values: matrix,
        }
    }

    /// Column names in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The full matrix.
    #[must_use]
    pub const fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    /// Number of feature columns.
    #[must_use]
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Row `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.values.row(index)
    }

    /// The column named `name`, if present.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.values.column(index))
    }

    /// Splits off the final row, which holds the synthetic target location
    /// when the table was built with one.
    ///
    /// Returns `None` for an empty table.
    #[must_use]
    pub fn split_last(&self) -> Option<(ArrayView2<'_, f64>, ArrayView1<'_, f64>)> {
        let last = self.n_rows().checked_sub(1)?;
        Some((
            self.values.slice(s![..last, ..]),
            self.values.index_axis(Axis(0), last),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_columns_transposes() {
        let table = FeatureTable::from_columns(
            3,
            vec!["a".to_string(), "b".to_string()],
            &[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
        );
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.n_columns(), 2);
        assert_eq!(table.row(1).to_vec(), vec![2.0, 5.0]);
        assert_eq!(table.column("b").unwrap().to_vec(), vec![4.0, 5.0, 6.0]);
        assert!(table.column("c").is_none());
    }

    #[test]
    fn split_last_separates_target_row() {
        let table = FeatureTable::from_columns(
            3,
            vec!["a".to_string()],
            &[vec![1.0, 2.0, 9.0]],
        );
        let (training, target) = table.split_last().unwrap();
        assert_eq!(training.nrows(), 2);
        assert_eq!(target.to_vec(), vec![9.0]);

        let empty = FeatureTable::from_columns(0, vec!["a".to_string()], &[vec![]]);
        assert!(empty.split_last().is_none());
    }
}

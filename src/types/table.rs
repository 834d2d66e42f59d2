//! Tabular request input
//!
//! Cells are kept as raw strings; numeric coercion happens per model once its
//! feature columns are known.

use ndarray::Array2;
use std::io::Read;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("could not read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV has no header row")]
    MissingHeader,
}

/// Rows of named, not-yet-numeric cells. Every row has one cell per column.
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table from already split rows.
    ///
    /// Rows shorter than the header are padded with empty cells and longer
    /// rows are truncated so the column invariant always holds.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { columns, rows }
    }

    /// Parse a headed CSV document
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let columns: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
        if columns.is_empty() {
            return Err(TableError::MissingHeader);
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }

        Ok(Self { columns, rows })
    }

    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self, TableError> {
        Self::from_csv_reader(bytes)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Coerce the named columns into a `rows x features` matrix.
    ///
    /// Missing, unparsable and NaN cells become 0.0. Names absent from the
    /// table yield an all-zero column.
    pub fn numeric_matrix(&self, features: &[String]) -> Array2<f64> {
        let indices: Vec<Option<usize>> = features.iter().map(|f| self.column_index(f)).collect();

        Array2::from_shape_fn((self.rows.len(), features.len()), |(r, c)| {
            indices[c]
                .map(|col| coerce_cell(&self.rows[r][col]))
                .unwrap_or(0.0)
        })
    }
}

/// Parse one cell as a float, 0.0 when that is impossible
pub fn coerce_cell(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if !v.is_nan() => v,
        _ => 0.0,
    }
}

//! Type definitions for the prediction service

pub mod prediction;
pub mod table;

pub use prediction::{PredictionReport, PredictionRow, PredictionSummary};
pub use table::{Table, TableError};

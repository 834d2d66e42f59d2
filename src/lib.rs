//! Exoplanet Ensemble Library
//!
//! Scores uploaded tables with one or more pre-trained binary classifiers,
//! maps each model's native output onto a [0, 1] probability and combines
//! the models with Borda, mean or vote aggregation.

pub mod config;
pub mod error;
pub mod feature_selector;
pub mod metrics;
pub mod models;
pub mod server;
pub mod types;

pub use config::AppConfig;
pub use error::PredictError;
pub use feature_selector::FeatureSelector;
pub use models::aggregator::AggregationMethod;
pub use models::inference::InferenceEngine;
pub use types::{prediction::PredictionReport, table::Table};

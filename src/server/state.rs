//! Shared, read-only application state

use std::sync::Arc;

use crate::config::{PredictionConfig, ResponseShape};
use crate::metrics::PredictionMetrics;
use crate::models::inference::InferenceEngine;

/// State shared by all handlers. Nothing here is mutated by a request except
/// the metrics counters.
pub struct AppState {
    pub engine: Arc<InferenceEngine>,
    pub metrics: Arc<PredictionMetrics>,
    /// Threshold and method used when the query omits them
    pub defaults: PredictionConfig,
    pub response_shape: ResponseShape,
}

impl AppState {
    pub fn new(
        engine: Arc<InferenceEngine>,
        metrics: Arc<PredictionMetrics>,
        defaults: PredictionConfig,
        response_shape: ResponseShape,
    ) -> Self {
        Self {
            engine,
            metrics,
            defaults,
            response_shape,
        }
    }
}

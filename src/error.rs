//! Request-level errors raised while scoring a table

use thiserror::Error;

/// A failure that aborts one prediction request. The service keeps running.
#[derive(Error, Debug)]
pub enum PredictError {
    #[error("the uploaded table has no rows")]
    EmptyTable,

    #[error(
        "no usable features for model {index} ({model}); the CSV should contain some of: {}",
        candidates.join(", ")
    )]
    NoUsableFeatures {
        /// 1-based model slot
        index: usize,
        model: String,
        candidates: Vec<String>,
    },

    #[error("unknown aggregation method '{0}', expected one of: borda, mean, vote")]
    UnknownMethod(String),

    #[error("threshold must be a finite number, got {0}")]
    InvalidThreshold(f64),

    #[error("model {model} returned {got} values for {expected} rows")]
    LengthMismatch {
        model: String,
        expected: usize,
        got: usize,
    },

    #[error("model {model} failed during inference: {message}")]
    Inference { model: String, message: String },
}

impl PredictError {
    /// Whether the caller can fix this by changing the request
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            PredictError::LengthMismatch { .. } | PredictError::Inference { .. }
        )
    }
}

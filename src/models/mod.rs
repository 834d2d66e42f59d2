//! Model loading, probability extraction, aggregation and orchestration

pub mod aggregator;
pub mod classifier;
pub mod inference;
pub mod loader;
pub mod onnx;

pub use aggregator::{AggregationMethod, ScoreAggregator};
pub use classifier::Classifier;
pub use inference::InferenceEngine;
pub use loader::{LoadedModel, ModelLoader};

//! Capability-tagged classifiers and positive-class probability extraction
//!
//! Every loaded model is exactly one of three kinds, decided once at load
//! time. Each kind maps its native output onto a `[0, 1]` probability per row.

use anyhow::Result;
use ndarray::Array2;

/// Guard against division by zero in min-max scaling
pub const MIN_MAX_EPSILON: f64 = 1e-9;

/// Raw `predict_proba`-style output
#[derive(Debug, Clone)]
pub enum ProbaOutput {
    /// `[rows, classes]` distribution
    Matrix(Array2<f64>),
    /// One distribution per internal sub-task; only the first is used
    PerTask(Vec<Array2<f64>>),
}

/// Produces a class distribution per row
pub trait ProbabilisticClassifier: Send + Sync {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<ProbaOutput>;
}

/// Produces an unbounded score per row, higher is more positive
pub trait ScoringClassifier: Send + Sync {
    fn decision_function(&self, x: &Array2<f64>) -> Result<Vec<f64>>;
}

/// Produces only a prediction per row, not necessarily in `[0, 1]`
pub trait DecidingClassifier: Send + Sync {
    fn predict(&self, x: &Array2<f64>) -> Result<Vec<f64>>;
}

/// A model tagged with the capability used to read probabilities from it
pub enum Classifier {
    Probabilistic(Box<dyn ProbabilisticClassifier>),
    Scoring(Box<dyn ScoringClassifier>),
    Deciding(Box<dyn DecidingClassifier>),
}

impl Classifier {
    pub fn kind(&self) -> &'static str {
        match self {
            Classifier::Probabilistic(_) => "probabilistic",
            Classifier::Scoring(_) => "scoring",
            Classifier::Deciding(_) => "deciding",
        }
    }

    /// Positive-class probability for every row of `x`.
    ///
    /// Scoring output is min-max scaled against this batch only, so the same
    /// score can map to different probabilities in different requests.
    pub fn extract_positive_probability(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        match self {
            Classifier::Probabilistic(model) => {
                let proba = match model.predict_proba(x)? {
                    ProbaOutput::Matrix(m) => m,
                    ProbaOutput::PerTask(tasks) => tasks
                        .into_iter()
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("predict_proba returned no distributions"))?,
                };
                Ok(positive_column(proba))
            }
            Classifier::Scoring(model) => {
                let scores = model.decision_function(x)?;
                Ok(min_max_scale(&scores))
            }
            Classifier::Deciding(model) => {
                let predictions = model.predict(x)?;
                Ok(rescale_predictions(predictions))
            }
        }
    }
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Classifier::{}", self.kind())
    }
}

/// Second column when there are at least two classes, otherwise the raw
/// values flattened in row-major order (left unclamped).
fn positive_column(proba: Array2<f64>) -> Vec<f64> {
    if proba.ncols() >= 2 {
        proba.column(1).to_vec()
    } else {
        proba.iter().copied().collect()
    }
}

/// `(s - min) / (max - min + eps)`
pub fn min_max_scale(scores: &[f64]) -> Vec<f64> {
    let Some((min, max)) = bounds(scores) else {
        return Vec::new();
    };
    let span = max - min + MIN_MAX_EPSILON;
    scores.iter().map(|s| (s - min) / span).collect()
}

/// Rescale only when the batch is not constant.
fn rescale_predictions(predictions: Vec<f64>) -> Vec<f64> {
    match bounds(&predictions) {
        Some((min, max)) if max - min > MIN_MAX_EPSILON => {
            predictions.iter().map(|y| (y - min) / (max - min)).collect()
        }
        _ => predictions,
    }
}

fn bounds(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some((min, max))
}

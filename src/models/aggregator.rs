//! Combination of per-model probability vectors into one ensemble vector

use crate::error::PredictError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Ensemble combination strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    /// Rank-based; each model awards N-1 .. 0 points by descending probability
    #[default]
    Borda,
    /// Arithmetic mean of probabilities
    Mean,
    /// Fraction of models whose probability reaches the threshold
    Vote,
}

impl AggregationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationMethod::Borda => "borda",
            AggregationMethod::Mean => "mean",
            AggregationMethod::Vote => "vote",
        }
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationMethod {
    type Err = PredictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "borda" => Ok(AggregationMethod::Borda),
            "mean" => Ok(AggregationMethod::Mean),
            "vote" => Ok(AggregationMethod::Vote),
            other => Err(PredictError::UnknownMethod(other.to_string())),
        }
    }
}

/// Aggregates probability vectors from multiple models.
///
/// All vectors must have the same length. A single vector is returned
/// unchanged whatever the method.
pub struct ScoreAggregator {
    method: AggregationMethod,
    /// Decision threshold, only consulted by `Vote`
    threshold: f64,
}

impl ScoreAggregator {
    pub fn new(method: AggregationMethod, threshold: f64) -> Self {
        Self { method, threshold }
    }

    /// Combine per-model vectors into one.
    pub fn aggregate(&self, prob_list: &[Vec<f64>]) -> Vec<f64> {
        match prob_list {
            [] => Vec::new(),
            [single] => single.clone(),
            _ => match self.method {
                AggregationMethod::Borda => Self::borda(prob_list),
                AggregationMethod::Mean => Self::mean(prob_list),
                AggregationMethod::Vote => Self::voting(prob_list, self.threshold),
            },
        }
    }

    /// Sum of per-model Borda points, divided by `M * max(N - 1, 1)`.
    ///
    /// Equal probabilities rank the earlier row higher.
    pub fn borda(prob_list: &[Vec<f64>]) -> Vec<f64> {
        let n = prob_list.first().map(Vec::len).unwrap_or(0);
        if prob_list.len() == 1 || n == 0 {
            return prob_list.first().cloned().unwrap_or_default();
        }

        let mut scores = vec![0.0; n];
        for probs in prob_list {
            let mut order: Vec<usize> = (0..n).collect();
            // stable: ties keep original row order
            order.sort_by(|&a, &b| descending(probs[a], probs[b]));
            for (rank, &idx) in order.iter().enumerate() {
                scores[idx] += (n - 1 - rank) as f64;
            }
        }

        let denom = (prob_list.len() * (n - 1).max(1)) as f64;
        scores.into_iter().map(|s| s / denom).collect()
    }

    /// Per-row arithmetic mean.
    pub fn mean(prob_list: &[Vec<f64>]) -> Vec<f64> {
        let n = prob_list.first().map(Vec::len).unwrap_or(0);
        let m = prob_list.len() as f64;
        (0..n)
            .map(|i| prob_list.iter().map(|p| p[i]).sum::<f64>() / m)
            .collect()
    }

    /// Per-row fraction of models with probability >= threshold.
    pub fn voting(prob_list: &[Vec<f64>], threshold: f64) -> Vec<f64> {
        let n = prob_list.first().map(Vec::len).unwrap_or(0);
        let m = prob_list.len() as f64;
        (0..n)
            .map(|i| {
                let votes = prob_list.iter().filter(|p| p[i] >= threshold).count();
                votes as f64 / m
            })
            .collect()
    }
}

/// Descending order where `0.0 == -0.0` and NaN ranks last.
fn descending(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        // adding 0.0 turns -0.0 into 0.0
        (false, false) => (b + 0.0).total_cmp(&(a + 0.0)),
    }
}

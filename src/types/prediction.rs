//! Prediction results and their JSON shapes

use crate::models::aggregator::AggregationMethod;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// One scored input row
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRow {
    /// Row index in the uploaded table
    pub index: usize,
    /// Combined probability, clamped to [0, 1]
    pub probability: f64,
    /// `probability >= threshold`
    pub label: bool,
    /// Per-model probability in load order
    pub model_probabilities: Vec<f64>,
}

/// Request-level totals
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionSummary {
    pub n: usize,
    pub positives: usize,
    pub negatives: usize,
    pub threshold: f64,
    pub method: AggregationMethod,
    pub models_loaded: usize,
    /// Feature set per model in load order
    pub features_used_per_model: Vec<Vec<String>>,
}

/// Full outcome of one prediction request
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionReport {
    pub summary: PredictionSummary,
    pub rows: Vec<PredictionRow>,
}

impl PredictionReport {
    /// Ensemble shape: method, model count and per-model breakdowns included
    pub fn multi_model(&self) -> MultiModelReport<'_> {
        MultiModelReport {
            summary: MultiModelSummary {
                n: self.summary.n,
                positives: self.summary.positives,
                negatives: self.summary.negatives,
                threshold: self.summary.threshold,
                method: self.summary.method,
                models_loaded: self.summary.models_loaded,
                features_used_per_model: &self.summary.features_used_per_model,
            },
            rows: self
                .rows
                .iter()
                .map(|row| MultiModelRow {
                    i: row.index,
                    prob: row.probability,
                    label: u8::from(row.label),
                    models: ModelSlots(&row.model_probabilities),
                })
                .collect(),
        }
    }

    /// Single-model shape: no method, no per-model breakdown
    pub fn single_model(&self) -> SingleModelReport<'_> {
        SingleModelReport {
            summary: SingleModelSummary {
                n: self.summary.n,
                positives: self.summary.positives,
                negatives: self.summary.negatives,
                threshold: self.summary.threshold,
                features_used: self
                    .summary
                    .features_used_per_model
                    .first()
                    .map(Vec::as_slice)
                    .unwrap_or(&[]),
            },
            rows: self
                .rows
                .iter()
                .map(|row| SingleModelRow {
                    i: row.index,
                    prob: row.probability,
                    label: u8::from(row.label),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MultiModelReport<'a> {
    pub summary: MultiModelSummary<'a>,
    pub rows: Vec<MultiModelRow<'a>>,
}

#[derive(Debug, Serialize)]
pub struct MultiModelSummary<'a> {
    pub n: usize,
    pub positives: usize,
    pub negatives: usize,
    pub threshold: f64,
    pub method: AggregationMethod,
    pub models_loaded: usize,
    pub features_used_per_model: &'a [Vec<String>],
}

#[derive(Debug, Serialize)]
pub struct MultiModelRow<'a> {
    pub i: usize,
    pub prob: f64,
    pub label: u8,
    pub models: ModelSlots<'a>,
}

/// Serializes as `{"m1": p1, "m2": p2, ...}` in load order
#[derive(Debug)]
pub struct ModelSlots<'a>(pub &'a [f64]);

impl Serialize for ModelSlots<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (j, p) in self.0.iter().enumerate() {
            map.serialize_entry(&format!("m{}", j + 1), p)?;
        }
        map.end()
    }
}

#[derive(Debug, Serialize)]
pub struct SingleModelReport<'a> {
    pub summary: SingleModelSummary<'a>,
    pub rows: Vec<SingleModelRow>,
}

#[derive(Debug, Serialize)]
pub struct SingleModelSummary<'a> {
    pub n: usize,
    pub positives: usize,
    pub negatives: usize,
    pub threshold: f64,
    pub features_used: &'a [String],
}

#[derive(Debug, Serialize)]
pub struct SingleModelRow {
    pub i: usize,
    pub prob: f64,
    pub label: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report() -> PredictionReport {
        PredictionReport {
            summary: PredictionSummary {
                n: 2,
                positives: 1,
                negatives: 1,
                threshold: 0.5,
                method: AggregationMethod::Mean,
                models_loaded: 2,
                features_used_per_model: vec![
                    vec!["pl_rade".to_string()],
                    vec!["st_teff".to_string(), "pl_orbper".to_string()],
                ],
            },
            rows: vec![
                PredictionRow {
                    index: 0,
                    probability: 0.75,
                    label: true,
                    model_probabilities: vec![0.5, 1.0],
                },
                PredictionRow {
                    index: 1,
                    probability: 0.25,
                    label: false,
                    model_probabilities: vec![0.0, 0.5],
                },
            ],
        }
    }

    #[test]
    fn test_multi_model_json() {
        let value = serde_json::to_value(report().multi_model()).unwrap();
        assert_eq!(
            value,
            json!({
                "summary": {
                    "n": 2,
                    "positives": 1,
                    "negatives": 1,
                    "threshold": 0.5,
                    "method": "mean",
                    "models_loaded": 2,
                    "features_used_per_model": [["pl_rade"], ["st_teff", "pl_orbper"]],
                },
                "rows": [
                    {"i": 0, "prob": 0.75, "label": 1, "models": {"m1": 0.5, "m2": 1.0}},
                    {"i": 1, "prob": 0.25, "label": 0, "models": {"m1": 0.0, "m2": 0.5}},
                ],
            })
        );
    }

    #[test]
    fn test_single_model_json_omits_ensemble_fields() {
        let value = serde_json::to_value(report().single_model()).unwrap();
        let summary = value["summary"].as_object().unwrap();

        assert!(!summary.contains_key("method"));
        assert!(!summary.contains_key("models_loaded"));
        assert_eq!(value["summary"]["features_used"], json!(["pl_rade"]));
        assert!(value["rows"][0].get("models").is_none());
        assert_eq!(value["rows"][1]["label"], json!(0));
    }
}

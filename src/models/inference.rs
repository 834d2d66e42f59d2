//! Multi-model prediction over an uploaded table

use crate::config::AppConfig;
use crate::error::PredictError;
use crate::feature_selector::FeatureSelector;
use crate::models::aggregator::{AggregationMethod, ScoreAggregator};
use crate::models::loader::{LoadedModel, ModelLoader};
use crate::types::prediction::{PredictionReport, PredictionRow, PredictionSummary};
use crate::types::table::Table;
use anyhow::Result;
use tracing::{debug, info};

/// Immutable set of loaded models plus the feature fallback.
///
/// Built once at startup and shared read-only by every request.
#[derive(Debug)]
pub struct InferenceEngine {
    /// Models in load order; slot `m{i+1}` is `models[i]`
    models: Vec<LoadedModel>,
    selector: FeatureSelector,
}

impl InferenceEngine {
    /// Load every configured ONNX model
    pub fn new(config: &AppConfig) -> Result<Self> {
        let loader = ModelLoader::with_threads(config.models.onnx_threads)?;
        let models = loader.load_all(&config.models.entries)?;
        let selector = FeatureSelector::new(config.prediction.candidates());

        info!(
            models = models.len(),
            candidates = ?selector.candidates(),
            "Inference engine initialized"
        );

        Self::from_models(models, selector)
    }

    /// Build from already loaded models. At least one model is required.
    pub fn from_models(models: Vec<LoadedModel>, selector: FeatureSelector) -> Result<Self> {
        if models.is_empty() {
            anyhow::bail!("No models loaded; at least one model is required");
        }
        Ok(Self { models, selector })
    }

    /// Get the number of loaded models
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// Get loaded model names
    pub fn model_names(&self) -> Vec<String> {
        self.models.iter().map(|m| m.name.clone()).collect()
    }

    /// Score every row of `table` with every model and combine the results.
    ///
    /// All-or-nothing: any model failing aborts the whole request.
    pub fn predict(
        &self,
        table: &Table,
        threshold: f64,
        method: AggregationMethod,
    ) -> Result<PredictionReport, PredictError> {
        if !threshold.is_finite() {
            return Err(PredictError::InvalidThreshold(threshold));
        }
        if table.is_empty() {
            return Err(PredictError::EmptyTable);
        }

        let n = table.row_count();
        debug!(rows = n, columns = table.columns().len(), models = self.models.len(), "Scoring table");
        let mut probs_all_models: Vec<Vec<f64>> = Vec::with_capacity(self.models.len());
        let mut features_used_per_model: Vec<Vec<String>> = Vec::with_capacity(self.models.len());

        for (i, model) in self.models.iter().enumerate() {
            let feats = self.selector.select(table, model.feature_names.as_deref());
            if feats.is_empty() {
                return Err(PredictError::NoUsableFeatures {
                    index: i + 1,
                    model: model.name.clone(),
                    candidates: self.selector.candidates().to_vec(),
                });
            }

            let x = table.numeric_matrix(&feats);
            let probs = model
                .classifier
                .extract_positive_probability(&x)
                .map_err(|e| PredictError::Inference {
                    model: model.name.clone(),
                    message: format!("{:#}", e),
                })?;

            if probs.len() != n {
                return Err(PredictError::LengthMismatch {
                    model: model.name.clone(),
                    expected: n,
                    got: probs.len(),
                });
            }

            debug!(
                model = %model.name,
                kind = model.classifier.kind(),
                features = feats.len(),
                "Model scored batch"
            );

            probs_all_models.push(probs);
            features_used_per_model.push(feats);
        }

        let aggregator = ScoreAggregator::new(method, threshold);
        let combined: Vec<f64> = aggregator
            .aggregate(&probs_all_models)
            .into_iter()
            .map(|p| p.clamp(0.0, 1.0))
            .collect();

        let rows: Vec<PredictionRow> = combined
            .iter()
            .enumerate()
            .map(|(i, &probability)| PredictionRow {
                index: i,
                probability,
                label: probability >= threshold,
                model_probabilities: probs_all_models.iter().map(|p| p[i]).collect(),
            })
            .collect();

        let positives = rows.iter().filter(|r| r.label).count();

        Ok(PredictionReport {
            summary: PredictionSummary {
                n: rows.len(),
                positives,
                negatives: rows.len() - positives,
                threshold,
                method,
                models_loaded: self.models.len(),
                features_used_per_model,
            },
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::classifier::{
        Classifier, DecidingClassifier, ProbaOutput, ProbabilisticClassifier, ScoringClassifier,
    };
    use ndarray::Array2;

    /// Returns a fixed positive-class probability per row
    struct FixedProba(Vec<f64>);

    impl ProbabilisticClassifier for FixedProba {
        fn predict_proba(&self, x: &Array2<f64>) -> anyhow::Result<ProbaOutput> {
            assert_eq!(x.nrows(), self.0.len());
            Ok(ProbaOutput::Matrix(Array2::from_shape_fn((self.0.len(), 2), |(r, c)| {
                if c == 1 {
                    self.0[r]
                } else {
                    1.0 - self.0[r]
                }
            })))
        }
    }

    /// Score equals the first feature
    struct FirstFeatureScore;

    impl ScoringClassifier for FirstFeatureScore {
        fn decision_function(&self, x: &Array2<f64>) -> anyhow::Result<Vec<f64>> {
            Ok(x.column(0).to_vec())
        }
    }

    struct Broken;

    impl DecidingClassifier for Broken {
        fn predict(&self, _x: &Array2<f64>) -> anyhow::Result<Vec<f64>> {
            anyhow::bail!("session exploded")
        }
    }

    struct WrongLength;

    impl DecidingClassifier for WrongLength {
        fn predict(&self, _x: &Array2<f64>) -> anyhow::Result<Vec<f64>> {
            Ok(vec![1.0])
        }
    }

    fn archive_table() -> Table {
        Table::new(
            vec!["pl_rade".to_string(), "pl_orbper".to_string(), "st_teff".to_string()],
            vec![
                vec!["1.0".to_string(), "10.0".to_string(), "5000".to_string()],
                vec!["1.0".to_string(), "10.0".to_string(), "5000".to_string()],
                vec!["1.0".to_string(), "10.0".to_string(), "5000".to_string()],
            ],
        )
    }

    fn engine(models: Vec<LoadedModel>) -> InferenceEngine {
        InferenceEngine::from_models(models, FeatureSelector::default()).unwrap()
    }

    fn proba_model(name: &str, probs: Vec<f64>) -> LoadedModel {
        LoadedModel::new(name, None, Classifier::Probabilistic(Box::new(FixedProba(probs))))
    }

    #[test]
    fn test_single_model_round_trip() {
        let engine = engine(vec![proba_model("kepler", vec![0.9, 0.4, 0.6])]);
        let report = engine
            .predict(&archive_table(), 0.5, AggregationMethod::Borda)
            .unwrap();

        let probs: Vec<f64> = report.rows.iter().map(|r| r.probability).collect();
        let labels: Vec<bool> = report.rows.iter().map(|r| r.label).collect();
        assert_eq!(probs, vec![0.9, 0.4, 0.6]);
        assert_eq!(labels, vec![true, false, true]);
        assert_eq!(report.summary.positives, 2);
        assert_eq!(report.summary.negatives, 1);
        assert_eq!(
            report.summary.features_used_per_model,
            vec![vec!["st_teff".to_string(), "pl_orbper".to_string(), "pl_rade".to_string()]]
        );
    }

    #[test]
    fn test_two_model_borda_ties_are_positive() {
        let table = Table::new(
            vec!["pl_rade".to_string()],
            vec![vec!["1".to_string()], vec!["2".to_string()]],
        );
        let engine = engine(vec![
            proba_model("a", vec![0.9, 0.1]),
            proba_model("b", vec![0.2, 0.8]),
        ]);

        let report = engine.predict(&table, 0.5, AggregationMethod::Borda).unwrap();
        assert_eq!(report.rows[0].probability, 0.5);
        assert_eq!(report.rows[1].probability, 0.5);
        assert!(report.rows.iter().all(|r| r.label));
        assert_eq!(report.rows[0].model_probabilities, vec![0.9, 0.2]);
        assert_eq!(report.summary.models_loaded, 2);
    }

    #[test]
    fn test_declared_features_drive_scoring_model() {
        let table = Table::new(
            vec!["st_teff".to_string(), "koi_score".to_string()],
            vec![
                vec!["5000".to_string(), "0".to_string()],
                vec!["6000".to_string(), "2".to_string()],
                vec!["7000".to_string(), "x".to_string()],
            ],
        );
        let model = LoadedModel::new(
            "koi",
            Some(vec!["koi_score".to_string()]),
            Classifier::Scoring(Box::new(FirstFeatureScore)),
        );
        let engine = engine(vec![model]);

        let report = engine.predict(&table, 0.5, AggregationMethod::Mean).unwrap();
        assert_eq!(report.summary.features_used_per_model[0], vec!["koi_score".to_string()]);
        // malformed cell coerced to 0.0 then min-max scaled
        assert_eq!(report.rows[2].probability, 0.0);
        assert!(report.rows[1].label);
    }

    #[test]
    fn test_empty_table_rejected() {
        let engine = engine(vec![proba_model("kepler", vec![])]);
        let table = Table::new(vec!["pl_rade".to_string()], vec![]);

        assert!(matches!(
            engine.predict(&table, 0.5, AggregationMethod::Borda),
            Err(PredictError::EmptyTable)
        ));
    }

    #[test]
    fn test_missing_features_aborts_request() {
        let engine = engine(vec![proba_model("kepler", vec![0.5])]);
        let table = Table::new(vec!["foo".to_string()], vec![vec!["1".to_string()]]);

        match engine.predict(&table, 0.5, AggregationMethod::Borda) {
            Err(PredictError::NoUsableFeatures { index, candidates, .. }) => {
                assert_eq!(index, 1);
                assert!(candidates.contains(&"pl_rade".to_string()));
            }
            other => panic!("expected NoUsableFeatures, got {:?}", other),
        }
    }

    #[test]
    fn test_model_failure_aborts_request() {
        let table = Table::new(vec!["pl_rade".to_string()], vec![vec!["1".to_string()]]);
        let engine = engine(vec![
            proba_model("ok", vec![0.7]),
            LoadedModel::new("broken", None, Classifier::Deciding(Box::new(Broken))),
        ]);

        let err = engine.predict(&table, 0.5, AggregationMethod::Mean).unwrap_err();
        assert!(matches!(err, PredictError::Inference { ref model, .. } if model == "broken"));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let engine = engine(vec![LoadedModel::new(
            "short",
            None,
            Classifier::Deciding(Box::new(WrongLength)),
        )]);

        let err = engine
            .predict(&archive_table(), 0.5, AggregationMethod::Borda)
            .unwrap_err();
        assert!(matches!(err, PredictError::LengthMismatch { expected: 3, got: 1, .. }));
    }

    #[test]
    fn test_degenerate_output_is_clamped() {
        struct OutOfRange;
        impl ProbabilisticClassifier for OutOfRange {
            fn predict_proba(&self, _x: &Array2<f64>) -> anyhow::Result<ProbaOutput> {
                Ok(ProbaOutput::Matrix(Array2::from_shape_vec((2, 1), vec![1.7, -0.3])?))
            }
        }

        let table = Table::new(
            vec!["pl_rade".to_string()],
            vec![vec!["1".to_string()], vec!["2".to_string()]],
        );
        let engine = engine(vec![LoadedModel::new(
            "odd",
            None,
            Classifier::Probabilistic(Box::new(OutOfRange)),
        )]);

        let report = engine.predict(&table, 0.5, AggregationMethod::Borda).unwrap();
        assert_eq!(report.rows[0].probability, 1.0);
        assert_eq!(report.rows[1].probability, 0.0);
        // per-model breakdown keeps the raw value
        assert_eq!(report.rows[0].model_probabilities, vec![1.7]);
    }

    #[test]
    fn test_no_models_is_fatal() {
        assert!(InferenceEngine::from_models(vec![], FeatureSelector::default()).is_err());
    }
}

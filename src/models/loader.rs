//! ONNX model loader and capability detection

use crate::config::{CapabilityHint, ModelEntry};
use crate::models::classifier::Classifier;
use crate::models::onnx::OnnxModel;
use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::tensor::TensorElementType;
use ort::value::ValueType;
use std::path::Path;
use tracing::info;

/// A model ready to serve requests
#[derive(Debug)]
pub struct LoadedModel {
    /// Model name
    pub name: String,
    /// Columns the model was trained on, if known
    pub feature_names: Option<Vec<String>>,
    /// How probabilities are read from the model
    pub classifier: Classifier,
}

impl LoadedModel {
    pub fn new(name: impl Into<String>, feature_names: Option<Vec<String>>, classifier: Classifier) -> Self {
        Self {
            name: name.into(),
            feature_names,
            classifier,
        }
    }
}

/// Name and structure of one model output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputInfo {
    pub name: String,
    /// `seq(map(...))` rather than a tensor
    pub is_sequence: bool,
    /// Element types can be read as numbers: numeric tensors and
    /// `seq(map(int64, float))`
    pub readable: bool,
}

impl OutputInfo {
    /// Describe an output from its ONNX type
    pub fn from_value_type(name: &str, value_type: &ValueType) -> Self {
        let (is_sequence, readable) = match value_type {
            ValueType::Sequence(inner) => (
                true,
                matches!(
                    inner.as_ref(),
                    ValueType::Map {
                        key: TensorElementType::Int64,
                        value: TensorElementType::Float32,
                    }
                ),
            ),
            ValueType::Tensor { ty, .. } => (
                false,
                matches!(
                    ty,
                    TensorElementType::Float32
                        | TensorElementType::Float64
                        | TensorElementType::Int64
                        | TensorElementType::Int32
                ),
            ),
            _ => (false, false),
        };
        Self {
            name: name.to_string(),
            is_sequence,
            readable,
        }
    }

    fn is_probabilistic(&self) -> bool {
        self.is_sequence || self.name.to_lowercase().contains("prob")
    }

    fn is_scoring(&self) -> bool {
        let name = self.name.to_lowercase();
        !self.is_sequence && (name.contains("score") || name.contains("decision"))
    }

    fn is_label(&self) -> bool {
        !self.is_sequence && self.name.to_lowercase().contains("label")
    }
}

/// Pick the capability and the output it reads, first match wins:
/// probabilities, then scores, then labels or any remaining tensor output.
///
/// Outputs whose element types cannot be read as numbers (string class
/// labels, string-keyed probability maps) are never chosen.
pub fn detect_capability(
    all_outputs: &[OutputInfo],
    hint: Option<CapabilityHint>,
) -> Result<(CapabilityHint, String)> {
    let outputs: Vec<&OutputInfo> = all_outputs.iter().filter(|o| o.readable).collect();
    let probabilistic = || outputs.iter().find(|o| o.is_probabilistic());
    let scoring = || outputs.iter().find(|o| o.is_scoring());
    let deciding = || {
        outputs
            .iter()
            .find(|o| o.is_label())
            .or_else(|| outputs.iter().find(|o| !o.is_sequence))
    };

    let found = match hint {
        Some(CapabilityHint::Probabilistic) => probabilistic().map(|o| (CapabilityHint::Probabilistic, o)),
        Some(CapabilityHint::Scoring) => scoring()
            .or_else(|| outputs.iter().find(|o| !o.is_sequence && !o.is_label()))
            .map(|o| (CapabilityHint::Scoring, o)),
        Some(CapabilityHint::Deciding) => deciding().map(|o| (CapabilityHint::Deciding, o)),
        None => probabilistic()
            .map(|o| (CapabilityHint::Probabilistic, o))
            .or_else(|| scoring().map(|o| (CapabilityHint::Scoring, o)))
            .or_else(|| deciding().map(|o| (CapabilityHint::Deciding, o))),
    };

    match found {
        Some((capability, output)) => Ok((capability, output.name.clone())),
        None => {
            let names: Vec<&str> = outputs.iter().map(|o| o.name.as_str()).collect();
            let unreadable: Vec<&str> = all_outputs
                .iter()
                .filter(|o| !o.readable)
                .map(|o| o.name.as_str())
                .collect();
            match hint {
                Some(hint) => anyhow::bail!(
                    "no output usable as {:?} among {:?} (non-numeric outputs: {:?})",
                    hint,
                    names,
                    unreadable
                ),
                None => anyhow::bail!(
                    "model exposes no numeric probability, score or prediction output \
                     (numeric: {:?}, non-numeric: {:?}); re-export it with integer class labels",
                    names,
                    unreadable
                ),
            }
        }
    }
}

/// Loader for ONNX models
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        // Initialize ONNX Runtime
        ort::init().commit()?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self { onnx_threads })
    }

    /// Load a single ONNX model described by a config entry
    pub fn load_model(&self, entry: &ModelEntry) -> Result<LoadedModel> {
        let path = Path::new(&entry.path);

        info!(model = %entry.name, path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .context(format!("Failed to load model from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let outputs: Vec<OutputInfo> = session
            .outputs
            .iter()
            .map(|o| OutputInfo::from_value_type(&o.name, &o.output_type))
            .collect();

        let (capability, output_name) = detect_capability(&outputs, entry.capability)
            .with_context(|| format!("Unsupported model {}", entry.name))?;

        info!(
            model = %entry.name,
            input = %input_name,
            output = %output_name,
            capability = ?capability,
            declared_features = entry.feature_names.as_ref().map(Vec::len).unwrap_or(0),
            "Model loaded successfully"
        );

        let onnx = OnnxModel::new(entry.name.clone(), session, input_name, output_name);
        let classifier = match capability {
            CapabilityHint::Probabilistic => Classifier::Probabilistic(Box::new(onnx)),
            CapabilityHint::Scoring => Classifier::Scoring(Box::new(onnx)),
            CapabilityHint::Deciding => Classifier::Deciding(Box::new(onnx)),
        };

        Ok(LoadedModel::new(
            entry.name.clone(),
            entry.feature_names.clone(),
            classifier,
        ))
    }

    /// Load every configured model in order. Any failure aborts startup.
    pub fn load_all(&self, entries: &[ModelEntry]) -> Result<Vec<LoadedModel>> {
        if entries.is_empty() {
            anyhow::bail!("No models configured");
        }

        let mut models = Vec::with_capacity(entries.len());
        for entry in entries {
            let model = self
                .load_model(entry)
                .with_context(|| format!("Model {} could not be loaded", entry.name))?;
            models.push(model);
        }

        info!(count = models.len(), "Loaded {} models", models.len());

        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor(name: &str) -> OutputInfo {
        OutputInfo {
            name: name.to_string(),
            is_sequence: false,
            readable: true,
        }
    }

    fn sequence(name: &str) -> OutputInfo {
        OutputInfo {
            name: name.to_string(),
            is_sequence: true,
            readable: true,
        }
    }

    fn string_tensor(name: &str) -> OutputInfo {
        OutputInfo {
            name: name.to_string(),
            is_sequence: false,
            readable: false,
        }
    }

    fn string_keyed_map(name: &str) -> OutputInfo {
        OutputInfo::from_value_type(
            name,
            &ValueType::Sequence(Box::new(ValueType::Map {
                key: TensorElementType::String,
                value: TensorElementType::Float32,
            })),
        )
    }

    #[test]
    fn test_output_types_classified() {
        let zipmap = OutputInfo::from_value_type(
            "output_probability",
            &ValueType::Sequence(Box::new(ValueType::Map {
                key: TensorElementType::Int64,
                value: TensorElementType::Float32,
            })),
        );
        assert!(zipmap.is_sequence && zipmap.readable);

        let keyed = string_keyed_map("output_probability");
        assert!(keyed.is_sequence && !keyed.readable);
    }

    #[test]
    fn test_string_class_model_rejected_at_load() {
        let outputs = vec![string_tensor("output_label"), string_keyed_map("output_probability")];
        let err = detect_capability(&outputs, None).unwrap_err();
        assert!(err.to_string().contains("output_probability"));

        assert!(detect_capability(&outputs, Some(CapabilityHint::Deciding)).is_err());
    }

    #[test]
    fn test_string_labels_skipped_for_numeric_probabilities() {
        let outputs = vec![string_tensor("output_label"), tensor("probabilities")];
        let (cap, name) = detect_capability(&outputs, None).unwrap();
        assert_eq!(cap, CapabilityHint::Probabilistic);
        assert_eq!(name, "probabilities");
    }

    #[test]
    fn test_sklearn_classifier_is_probabilistic() {
        let outputs = vec![tensor("output_label"), tensor("output_probability")];
        let (cap, name) = detect_capability(&outputs, None).unwrap();
        assert_eq!(cap, CapabilityHint::Probabilistic);
        assert_eq!(name, "output_probability");
    }

    #[test]
    fn test_sequence_map_is_probabilistic() {
        let outputs = vec![tensor("label"), sequence("zipmap")];
        let (cap, name) = detect_capability(&outputs, None).unwrap();
        assert_eq!(cap, CapabilityHint::Probabilistic);
        assert_eq!(name, "zipmap");
    }

    #[test]
    fn test_scores_without_probabilities() {
        let outputs = vec![tensor("label"), tensor("decision_scores")];
        let (cap, name) = detect_capability(&outputs, None).unwrap();
        assert_eq!(cap, CapabilityHint::Scoring);
        assert_eq!(name, "decision_scores");
    }

    #[test]
    fn test_label_only_is_deciding() {
        let (cap, name) = detect_capability(&[tensor("variable")], None).unwrap();
        assert_eq!(cap, CapabilityHint::Deciding);
        assert_eq!(name, "variable");

        let (cap, name) = detect_capability(&[tensor("y"), tensor("label")], None).unwrap();
        assert_eq!(cap, CapabilityHint::Deciding);
        assert_eq!(name, "label");
    }

    #[test]
    fn test_no_outputs_rejected() {
        assert!(detect_capability(&[], None).is_err());
    }

    #[test]
    fn test_hint_overrides_priority() {
        let outputs = vec![tensor("output_label"), tensor("output_probability")];
        let (cap, name) = detect_capability(&outputs, Some(CapabilityHint::Deciding)).unwrap();
        assert_eq!(cap, CapabilityHint::Deciding);
        assert_eq!(name, "output_label");

        let (cap, name) = detect_capability(&[tensor("variable")], Some(CapabilityHint::Scoring)).unwrap();
        assert_eq!(cap, CapabilityHint::Scoring);
        assert_eq!(name, "variable");

        assert!(detect_capability(&[tensor("label")], Some(CapabilityHint::Probabilistic)).is_err());
    }
}

//! ONNX Runtime backed classifiers
//!
//! One session per model. The session is locked for the duration of a run
//! because `Session::run` needs exclusive access; the model itself is never
//! modified after loading.

use crate::models::classifier::{
    DecidingClassifier, ProbaOutput, ProbabilisticClassifier, ScoringClassifier,
};
use anyhow::{Context, Result};
use ndarray::Array2;
use ort::memory::Allocator;
use ort::session::Session;
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::collections::BTreeSet;
use std::sync::Mutex;
use tracing::debug;

/// A loaded ONNX session and the output it is read from
pub struct OnnxModel {
    name: String,
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxModel {
    pub fn new(name: String, session: Session, input_name: String, output_name: String) -> Self {
        Self {
            name,
            session: Mutex::new(session),
            input_name,
            output_name,
        }
    }

    /// Run the model on `x` and hand the selected output to `read`.
    fn run<T>(&self, x: &Array2<f64>, read: impl FnOnce(&DynValue) -> Result<T>) -> Result<T> {
        // Prepare input tensor - shape [rows, num_features]
        let shape = vec![x.nrows() as i64, x.ncols() as i64];
        let data: Vec<f32> = x.iter().map(|&v| v as f32).collect();
        let input_tensor =
            Tensor::from_array((shape, data)).context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let outputs = session.run(ort::inputs![&self.input_name => input_tensor])?;

        let output = outputs.get(&self.output_name).ok_or_else(|| {
            anyhow::anyhow!("model {} produced no output named {}", self.name, self.output_name)
        })?;

        read(output)
    }
}

impl ProbabilisticClassifier for OnnxModel {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<ProbaOutput> {
        self.run(x, |output| {
            let dtype = output.dtype();

            // seq(map(int64, float)) from LightGBM/CatBoost style exports
            if DynSequenceValueType::can_downcast(&dtype) {
                let matrix = sequence_map_to_matrix(output)?;
                debug!(model = %self.name, rows = matrix.nrows(), classes = matrix.ncols(), "Extracted from seq(map)");
                return Ok(ProbaOutput::Matrix(matrix));
            }

            let (dims, data) = tensor_to_f64(output)?;
            let matrix = match dims.as_slice() {
                [n, classes] => Array2::from_shape_vec((*n as usize, *classes as usize), data)?,
                // a flat vector goes through the single-column fallback
                _ => Array2::from_shape_vec((data.len(), 1), data)?,
            };
            debug!(model = %self.name, rows = matrix.nrows(), classes = matrix.ncols(), "Extracted from tensor");
            Ok(ProbaOutput::Matrix(matrix))
        })
    }
}

impl ScoringClassifier for OnnxModel {
    fn decision_function(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        self.run(x, |output| {
            let (dims, data) = tensor_to_f64(output)?;
            Ok(one_value_per_row(&dims, data))
        })
    }
}

impl DecidingClassifier for OnnxModel {
    fn predict(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        self.run(x, |output| {
            let (dims, data) = tensor_to_f64(output)?;
            Ok(one_value_per_row(&dims, data))
        })
    }
}

/// Read a numeric tensor of any common element type as f64.
fn tensor_to_f64(output: &DynValue) -> Result<(Vec<i64>, Vec<f64>)> {
    if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
        return Ok((shape.iter().copied().collect(), data.iter().map(|&v| v as f64).collect()));
    }
    if let Ok((shape, data)) = output.try_extract_tensor::<f64>() {
        return Ok((shape.iter().copied().collect(), data.to_vec()));
    }
    if let Ok((shape, data)) = output.try_extract_tensor::<i64>() {
        return Ok((shape.iter().copied().collect(), data.iter().map(|&v| v as f64).collect()));
    }
    if let Ok((shape, data)) = output.try_extract_tensor::<i32>() {
        return Ok((shape.iter().copied().collect(), data.iter().map(|&v| v as f64).collect()));
    }
    anyhow::bail!("output is not a numeric tensor")
}

/// `[N]` and `[N, 1]` pass through; `[N, k]` keeps the last column.
fn one_value_per_row(dims: &[i64], data: Vec<f64>) -> Vec<f64> {
    match dims {
        [_, cols] if *cols > 1 => {
            let cols = *cols as usize;
            data.chunks(cols).map(|row| row[cols - 1]).collect()
        }
        _ => data,
    }
}

/// Convert `seq(map(int64, float))` into a `[rows, classes]` matrix ordered
/// by class id. Classes missing from a row's map are 0.0.
fn sequence_map_to_matrix(output: &DynValue) -> Result<Array2<f64>> {
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| anyhow::anyhow!("Failed to downcast to sequence: {}", e))?;

    let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;

    let mut rows: Vec<Vec<(i64, f32)>> = Vec::with_capacity(maps.len());
    for map_value in &maps {
        rows.push(map_value.try_extract_key_values::<i64, f32>()?);
    }

    Ok(class_maps_to_matrix(&rows))
}

fn class_maps_to_matrix(rows: &[Vec<(i64, f32)>]) -> Array2<f64> {
    let classes: Vec<i64> = rows
        .iter()
        .flat_map(|row| row.iter().map(|(class_id, _)| *class_id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut matrix = Array2::zeros((rows.len(), classes.len()));
    for (r, row) in rows.iter().enumerate() {
        for (class_id, prob) in row {
            if let Ok(c) = classes.binary_search(class_id) {
                matrix[[r, c]] = *prob as f64;
            }
        }
    }
    matrix
}

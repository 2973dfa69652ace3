//! ONNX Runtime backend for bundles exported to ONNX

use crate::error::InferenceError;
use crate::models::inference::RiskModel;
use anyhow::{Context, Result};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, Tensor};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Loaded ONNX classifier
pub struct OnnxModel {
    /// `Session::run` needs exclusive access
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxModel {
    /// Load an ONNX graph from file
    pub fn load<P: AsRef<Path>>(path: P, threads: usize) -> Result<Self> {
        let path = path.as_ref();

        ort::init().commit()?;
        info!(path = %path.display(), threads = threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(threads)?
            .commit_from_file(path)
            .context(format!("Failed to load ONNX model from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        info!(input = %input_name, output = %output_name, "ONNX model loaded");

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }

    fn extract_probability(&self, outputs: &SessionOutputs) -> Result<f64, InferenceError> {
        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            InferenceError::Backend(format!("output `{}` missing", self.output_name))
        })?;

        // [batch, classes] tensor (zipmap disabled at export)
        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            let classes = dims.last().copied().unwrap_or(0);
            let positive = match classes {
                1 => data.first(),
                n if n >= 2 => data.get(1),
                _ => None,
            };
            return positive.map(|&p| p as f64).ok_or_else(|| {
                InferenceError::Backend(format!("unexpected probability shape {:?}", dims))
            });
        }

        // seq(map(int64, float)) from the default sklearn-onnx zipmap
        if DynSequenceValueType::can_downcast(&output.dtype()) {
            let allocator = Allocator::default();
            let sequence = output
                .downcast_ref::<DynSequenceValueType>()
                .map_err(|e| InferenceError::Backend(e.to_string()))?;
            let maps = sequence
                .try_extract_sequence::<DynMapValueType>(&allocator)
                .map_err(|e| InferenceError::Backend(e.to_string()))?;
            let first = maps
                .first()
                .ok_or_else(|| InferenceError::Backend("empty probability sequence".to_string()))?;
            let pairs = first
                .try_extract_key_values::<i64, f32>()
                .map_err(|e| InferenceError::Backend(e.to_string()))?;

            debug!(pairs = ?pairs, "Extracted from seq(map)");
            return pairs
                .iter()
                .find(|(class_id, _)| *class_id == 1)
                .map(|(_, p)| *p as f64)
                .ok_or_else(|| InferenceError::Backend("no positive class in output".to_string()));
        }

        Err(InferenceError::Backend(format!(
            "unsupported output type for `{}`",
            self.output_name
        )))
    }
}

impl RiskModel for OnnxModel {
    fn kind(&self) -> &'static str {
        "onnx"
    }

    fn positive_probability(&self, row: &[f64]) -> Result<f64, InferenceError> {
        let shape = vec![1_i64, row.len() as i64];
        let values: Vec<f32> = row.iter().map(|&v| v as f32).collect();
        let input_tensor = Tensor::from_array((shape, values))
            .map_err(|e| InferenceError::Backend(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| InferenceError::Backend(format!("Lock error: {}", e)))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| InferenceError::Backend(e.to_string()))?;

        self.extract_probability(&outputs)
    }
}

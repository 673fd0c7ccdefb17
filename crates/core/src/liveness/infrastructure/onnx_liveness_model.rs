use std::path::Path;

use crate::detection::infrastructure::execution_provider::load_session;
use crate::liveness::domain::liveness_model::{LivenessError, LivenessModel};

/// Two-class anti-spoofing classifier backed by an ONNX Runtime session.
///
/// A model created with [`OnnxLivenessModel::pending`] has no session and
/// reports not-ready until one is loaded.
pub struct OnnxLivenessModel {
    session: Option<ort::session::Session>,
}

impl OnnxLivenessModel {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            session: Some(load_session(model_path)?),
        })
    }

    pub fn pending() -> Self {
        Self { session: None }
    }

    pub fn load(&mut self, model_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        self.session = Some(load_session(model_path)?);
        Ok(())
    }
}

impl LivenessModel for OnnxLivenessModel {
    fn is_ready(&self) -> bool {
        self.session.is_some()
    }

    fn infer(&mut self, input: ndarray::Array4<f32>) -> Result<[f32; 2], LivenessError> {
        let session = self.session.as_mut().ok_or(LivenessError::NotReady)?;

        let input_value = ort::value::Tensor::from_array(input)
            .map_err(|e| LivenessError::Inference(e.to_string()))?;
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| LivenessError::Inference(e.to_string()))?;
        let logits = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| LivenessError::Inference(e.to_string()))?;

        let values: Vec<f32> = logits.iter().copied().collect();
        match values.as_slice() {
            [live, spoof] => Ok([*live, *spoof]),
            other => Err(LivenessError::UnexpectedOutput(other.len())),
        }
    }
}

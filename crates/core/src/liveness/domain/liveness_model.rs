use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LivenessError {
    #[error("liveness model is not initialized")]
    NotReady,
    #[error("invalid face crop: {0}")]
    InvalidCrop(String),
    #[error("liveness model returned {0} values, expected 2 logits")]
    UnexpectedOutput(usize),
    #[error("liveness inference failed: {0}")]
    Inference(String),
}

/// Black-box anti-spoofing classifier.
///
/// Takes a preprocessed `[1, 3, S, S]` crop and returns
/// `[live_logit, spoof_logit]`.
pub trait LivenessModel: Send {
    fn is_ready(&self) -> bool;

    fn infer(&mut self, input: ndarray::Array4<f32>) -> Result<[f32; 2], LivenessError>;
}

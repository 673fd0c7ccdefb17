use crate::shared::frame::Frame;

use super::candidate::Detection;

/// Domain interface for face detection.
///
/// Implementations may hold inference sessions that need `&mut self`.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>>;
}

/// SCRFD face detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing and inference, then hands the per-stride
/// output tensors to the domain's `AnchorDecoder` and `Suppressor`.
use std::path::Path;

use crate::detection::domain::anchor_decoder::AnchorDecoder;
use crate::detection::domain::candidate::Detection;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::raw_output::{RawOutputSet, StrideOutput};
use crate::detection::domain::suppressor::Suppressor;
use crate::shared::config::DetectorConfig;
use crate::shared::frame::Frame;

use super::execution_provider::{declared_input_size, load_session};
use super::letterbox::letterbox;

/// SCRFD face detector backed by an ONNX Runtime session.
pub struct OnnxScrfdDetector {
    session: ort::session::Session,
    decoder: AnchorDecoder,
    suppressor: Suppressor,
    strides: Vec<u32>,
    input_size: u32,
}

impl OnnxScrfdDetector {
    /// Load an SCRFD ONNX model.
    ///
    /// The input resolution is read from the model's input shape (NCHW),
    /// falling back to `config.input_size` when the shape is dynamic.
    pub fn new(model_path: &Path, config: &DetectorConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let session = load_session(model_path)?;
        let input_size = declared_input_size(&session).unwrap_or(config.input_size);
        let decoder = AnchorDecoder::new(config).with_input_size(input_size, input_size);

        Ok(Self {
            session,
            decoder,
            suppressor: Suppressor::from_config(config),
            strides: config.strides.clone(),
            input_size,
        })
    }
}

impl FaceDetector for OnnxScrfdDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
        if frame.is_empty() || frame.channels() < 3 {
            return Err(format!(
                "unsupported frame {}x{}x{}",
                frame.width(),
                frame.height(),
                frame.channels()
            )
            .into());
        }

        // 1. Preprocess: letterbox + normalize → NCHW float32
        let (input_tensor, det_scale) = letterbox(frame, self.input_size);

        // 2. Inference
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        let mut tensors = Vec::with_capacity(outputs.len());
        for i in 0..outputs.len() {
            let array = outputs[i].try_extract_array::<f32>()?;
            tensors.push(array.iter().copied().collect::<Vec<f32>>());
        }

        // 3. Split into per-stride outputs, decode, suppress
        let raw = split_outputs(tensors, &self.strides, det_scale)?;
        let candidates = self.decoder.decode(&raw);
        log::debug!(
            "frame {}: {} candidates above threshold",
            frame.index(),
            candidates.len()
        );

        Ok(self.suppressor.run(
            candidates,
            raw.det_scale,
            frame.width() as f64,
            frame.height() as f64,
        )?)
    }
}

/// Group flat output tensors by stride.
///
/// SCRFD exports scores for every stride first, then boxes, then (for
/// `_kps` models) landmarks: `[s8, s16, s32, b8, b16, b32, k8, k16, k32]`.
fn split_outputs(
    mut tensors: Vec<Vec<f32>>,
    strides: &[u32],
    det_scale: f64,
) -> Result<RawOutputSet, Box<dyn std::error::Error>> {
    let n = strides.len();
    let has_landmarks = match tensors.len() {
        t if t == n * 3 => true,
        t if t == n * 2 => false,
        t => {
            return Err(format!("expected {} or {} outputs, got {t}", n * 2, n * 3).into());
        }
    };

    let mut landmarks: Vec<Option<Vec<f32>>> = if has_landmarks {
        tensors.drain(n * 2..).map(Some).collect()
    } else {
        vec![None; n]
    };
    let boxes: Vec<Vec<f32>> = tensors.drain(n..).collect();
    let scores = tensors;

    let per_stride = strides
        .iter()
        .zip(scores)
        .zip(boxes)
        .enumerate()
        .map(|(i, ((&stride, s), b))| StrideOutput::new(stride, s, b, landmarks[i].take()))
        .collect();

    Ok(RawOutputSet::new(per_stride, det_scale))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_outputs_with_landmarks() {
        let tensors: Vec<Vec<f32>> = (0..9).map(|i| vec![i as f32]).collect();
        let raw = split_outputs(tensors, &[8, 16, 32], 0.5).unwrap();

        assert_eq!(raw.strides.len(), 3);
        assert_eq!(raw.strides[1].stride, 16);
        assert_eq!(raw.strides[1].scores, vec![1.0]);
        assert_eq!(raw.strides[1].boxes, vec![4.0]);
        assert_eq!(raw.strides[1].landmarks, Some(vec![7.0]));
        assert_eq!(raw.det_scale, 0.5);
    }

    #[test]
    fn test_split_outputs_without_landmarks() {
        let tensors: Vec<Vec<f32>> = (0..6).map(|i| vec![i as f32]).collect();
        let raw = split_outputs(tensors, &[8, 16, 32], 1.0).unwrap();

        assert_eq!(raw.strides[2].scores, vec![2.0]);
        assert_eq!(raw.strides[2].boxes, vec![5.0]);
        assert!(raw.strides.iter().all(|s| s.landmarks.is_none()));
    }

    #[test]
    fn test_split_outputs_rejects_unexpected_count() {
        let tensors: Vec<Vec<f32>> = (0..4).map(|i| vec![i as f32]).collect();
        assert!(split_outputs(tensors, &[8, 16, 32], 1.0).is_err());
    }
}

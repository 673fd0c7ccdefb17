//! Distance-to-box decoding of anchor-free multi-stride detector output.
//!
//! Each feature-map position predicts four distances from its anchor center
//! to the box edges, plus optional landmark offsets, all in stride units.

use thiserror::Error;

use crate::shared::bbox::BoundingBox;
use crate::shared::config::DetectorConfig;

use super::anchor_cache::AnchorCache;
use super::candidate::{Candidate, Landmarks};
use super::raw_output::{RawOutputSet, StrideOutput};

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
    #[error("stride {stride}: {tensor} has {actual} values, expected {expected}")]
    ShapeMismatch {
        stride: u32,
        tensor: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("stride {0} does not divide the model input")]
    InvalidStride(u32),
}

pub struct AnchorDecoder {
    input_width: u32,
    input_height: u32,
    anchors_per_position: usize,
    confidence_threshold: f64,
    cache: AnchorCache,
}

impl AnchorDecoder {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            input_width: config.input_size,
            input_height: config.input_size,
            anchors_per_position: config.anchors_per_position,
            confidence_threshold: config.confidence_threshold,
            cache: AnchorCache::new(config.anchor_cache_capacity),
        }
    }

    /// Override the network input resolution (e.g. read from the model).
    pub fn with_input_size(mut self, width: u32, height: u32) -> Self {
        self.input_width = width;
        self.input_height = height;
        self
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    pub fn anchor_cache(&self) -> &AnchorCache {
        &self.cache
    }

    /// Decode every stride. A malformed stride is logged and contributes
    /// no candidates; the others are unaffected.
    pub fn decode(&mut self, outputs: &RawOutputSet) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for stride_output in &outputs.strides {
            match self.decode_stride(stride_output) {
                Ok(mut found) => candidates.append(&mut found),
                Err(e) => log::warn!("Skipping stride output: {e}"),
            }
        }
        candidates
    }

    pub fn decode_stride(&mut self, output: &StrideOutput) -> Result<Vec<Candidate>, DecodeError> {
        if output.is_empty() {
            return Ok(Vec::new());
        }

        let stride = output.stride;
        if stride == 0 || self.input_width % stride != 0 || self.input_height % stride != 0 {
            return Err(DecodeError::InvalidStride(stride));
        }
        let grid_w = (self.input_width / stride) as usize;
        let grid_h = (self.input_height / stride) as usize;
        let n = grid_h * grid_w * self.anchors_per_position;

        check_len(stride, "scores", n, output.scores.len())?;
        check_len(stride, "boxes", n * 4, output.boxes.len())?;
        if let Some(ref kps) = output.landmarks {
            check_len(stride, "landmarks", n * 10, kps.len())?;
        }

        let centers = self
            .cache
            .centers((grid_h, grid_w, stride, self.anchors_per_position));
        let s = stride as f64;

        let mut candidates = Vec::new();
        for (i, &raw_score) in output.scores.iter().enumerate() {
            let score = raw_score as f64;
            if score.is_nan() || score < self.confidence_threshold {
                continue;
            }

            let (cx, cy) = centers[i];
            let d = &output.boxes[i * 4..i * 4 + 4];
            let bbox = BoundingBox::new(
                cx - d[0] as f64 * s,
                cy - d[1] as f64 * s,
                cx + d[2] as f64 * s,
                cy + d[3] as f64 * s,
            );

            let landmarks = output.landmarks.as_ref().map(|kps| {
                let k = &kps[i * 10..i * 10 + 10];
                let mut points: Landmarks = [(0.0, 0.0); 5];
                for (p, point) in points.iter_mut().enumerate() {
                    *point = (cx + k[p * 2] as f64 * s, cy + k[p * 2 + 1] as f64 * s);
                }
                points
            });

            candidates.push(Candidate {
                score,
                bbox,
                landmarks,
            });
        }
        Ok(candidates)
    }
}

fn check_len(
    stride: u32,
    tensor: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), DecodeError> {
    if expected == actual {
        Ok(())
    } else {
        Err(DecodeError::ShapeMismatch {
            stride,
            tensor,
            expected,
            actual,
        })
    }
}

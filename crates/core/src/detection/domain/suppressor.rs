use std::cmp::Ordering;

use thiserror::Error;

use crate::shared::config::DetectorConfig;

use super::candidate::{Candidate, Detection};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SuppressError {
    #[error("detection scale must be positive and finite, got {0}")]
    InvalidScale(f64),
}

/// Greedy non-maximum suppression plus rescaling to image coordinates.
pub struct Suppressor {
    iou_threshold: f64,
    top_k: usize,
}

impl Suppressor {
    pub fn new(iou_threshold: f64, top_k: usize) -> Self {
        Self {
            iou_threshold,
            top_k,
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(config.iou_threshold, config.top_k)
    }

    /// Keep the highest-scoring candidate of every overlapping cluster.
    ///
    /// Output is sorted by descending score and holds at most `top_k`
    /// entries; no two survivors overlap by more than the IoU threshold.
    pub fn suppress(&self, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        let mut keep: Vec<Candidate> = Vec::new();
        let mut suppressed = vec![false; candidates.len()];

        for i in 0..candidates.len() {
            if suppressed[i] {
                continue;
            }
            for j in (i + 1)..candidates.len() {
                if !suppressed[j] && candidates[i].bbox.iou(&candidates[j].bbox) > self.iou_threshold
                {
                    suppressed[j] = true;
                }
            }
            keep.push(candidates[i].clone());
            if keep.len() >= self.top_k {
                break;
            }
        }
        keep
    }

    /// Suppress, then map survivors into original frame coordinates.
    pub fn run(
        &self,
        candidates: Vec<Candidate>,
        det_scale: f64,
        frame_width: f64,
        frame_height: f64,
    ) -> Result<Vec<Detection>, SuppressError> {
        if !(det_scale.is_finite() && det_scale > 0.0) {
            return Err(SuppressError::InvalidScale(det_scale));
        }
        Ok(self
            .suppress(candidates)
            .into_iter()
            .map(|c| c.into_detection(det_scale, frame_width, frame_height))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::bbox::BoundingBox;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn cand(x1: f64, y1: f64, x2: f64, y2: f64, score: f64) -> Candidate {
        Candidate {
            score,
            bbox: BoundingBox::new(x1, y1, x2, y2),
            landmarks: None,
        }
    }

    fn grid_candidates() -> Vec<Candidate> {
        // Heavily overlapping lattice with varied scores
        let mut out = Vec::new();
        for i in 0..6 {
            for j in 0..6 {
                let x = i as f64 * 15.0;
                let y = j as f64 * 15.0;
                let score = ((i * 7 + j * 13) % 17) as f64 / 17.0;
                out.push(cand(x, y, x + 40.0, y + 40.0, score));
            }
        }
        out
    }

    #[test]
    fn test_keeps_higher_scoring_of_overlapping_pair() {
        // IoU = 7500 / 12500 = 0.6
        let a = cand(0.0, 0.0, 100.0, 100.0, 0.7);
        let b = cand(25.0, 0.0, 125.0, 100.0, 0.9);
        assert_relative_eq!(a.bbox.iou(&b.bbox), 0.6);

        let kept = Suppressor::new(0.4, 100).suppress(vec![a, b.clone()]);

        assert_eq!(kept, vec![b]);
    }

    #[test]
    fn test_keeps_separate_faces() {
        let kept = Suppressor::new(0.4, 100).suppress(vec![
            cand(0.0, 0.0, 50.0, 50.0, 0.9),
            cand(200.0, 200.0, 250.0, 250.0, 0.8),
        ]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_output_sorted_by_score() {
        let kept = Suppressor::new(0.4, 100).suppress(vec![
            cand(0.0, 0.0, 50.0, 50.0, 0.6),
            cand(100.0, 0.0, 150.0, 50.0, 0.9),
            cand(200.0, 0.0, 250.0, 50.0, 0.75),
        ]);
        let scores: Vec<f64> = kept.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![0.9, 0.75, 0.6]);
    }

    #[test]
    fn test_empty_input() {
        assert!(Suppressor::new(0.4, 100).suppress(Vec::new()).is_empty());
        assert!(Suppressor::new(0.4, 100)
            .run(Vec::new(), 1.0, 640.0, 480.0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_survivors_never_exceed_iou_threshold() {
        let kept = Suppressor::new(0.4, 1000).suppress(grid_candidates());
        for (i, a) in kept.iter().enumerate() {
            for b in &kept[i + 1..] {
                assert!(a.bbox.iou(&b.bbox) <= 0.4);
            }
        }
    }

    #[test]
    fn test_suppression_is_idempotent() {
        let suppressor = Suppressor::new(0.4, 1000);
        let once = suppressor.suppress(grid_candidates());
        let twice = suppressor.suppress(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_top_k_caps_output() {
        let candidates: Vec<Candidate> = (0..10)
            .map(|i| {
                let x = i as f64 * 100.0;
                cand(x, 0.0, x + 50.0, 50.0, 0.5 + i as f64 * 0.01)
            })
            .collect();
        let kept = Suppressor::new(0.4, 3).suppress(candidates);
        assert_eq!(kept.len(), 3);
        assert_relative_eq!(kept[0].score, 0.59);
    }

    #[test]
    fn test_run_rescales_to_frame() {
        let detections = Suppressor::new(0.4, 10).run(
            vec![cand(32.0, 16.0, 64.0, 48.0, 0.9)],
            0.5,
            1280.0,
            960.0,
        )
        .unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox, BoundingBox::new(64.0, 32.0, 128.0, 96.0));
        assert_relative_eq!(detections[0].confidence, 0.9);
    }

    #[rstest]
    #[case::zero(0.0)]
    #[case::negative(-0.5)]
    #[case::nan(f64::NAN)]
    #[case::infinite(f64::INFINITY)]
    fn test_run_rejects_invalid_scale(#[case] det_scale: f64) {
        let result = Suppressor::new(0.4, 10).run(
            vec![cand(32.0, 16.0, 64.0, 48.0, 0.9)],
            det_scale,
            1280.0,
            960.0,
        );
        assert!(matches!(result, Err(SuppressError::InvalidScale(_))));
    }
}

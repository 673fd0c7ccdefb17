use serde::{Deserialize, Serialize};

use crate::shared::bbox::BoundingBox;

/// Five facial points: left eye, right eye, nose, left mouth, right mouth.
pub type Landmarks = [(f64, f64); 5];

/// One decoded anchor in model-input pixel space, before suppression.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub score: f64,
    pub bbox: BoundingBox,
    pub landmarks: Option<Landmarks>,
}

impl Candidate {
    /// Map back to original image coordinates and clip to the frame.
    ///
    /// `det_scale` is `resized / original`, so coordinates are divided by it.
    pub fn into_detection(self, det_scale: f64, frame_width: f64, frame_height: f64) -> Detection {
        let full = self.bbox.unscale(det_scale);
        let bbox = full.clamp(frame_width, frame_height);
        let visible_fraction = if full.area() > 0.0 {
            (bbox.area() / full.area()).min(1.0)
        } else {
            0.0
        };
        let max_x = (frame_width - 1.0).max(0.0);
        let max_y = (frame_height - 1.0).max(0.0);
        let landmarks = self.landmarks.map(|points| {
            points.map(|(x, y)| {
                (
                    (x / det_scale).clamp(0.0, max_x),
                    (y / det_scale).clamp(0.0, max_y),
                )
            })
        });
        Detection {
            bbox,
            confidence: self.score,
            landmarks,
            visible_fraction,
        }
    }
}

/// A face that survived suppression, in original image coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub landmarks: Option<Landmarks>,
    /// Share of the unclipped box that lies inside the frame.
    #[serde(default = "fully_visible")]
    pub visible_fraction: f64,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f64) -> Self {
        Self {
            bbox,
            confidence,
            landmarks: None,
            visible_fraction: 1.0,
        }
    }
}

fn fully_visible() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_into_detection_unscales_box_and_landmarks() {
        let candidate = Candidate {
            score: 0.9,
            bbox: BoundingBox::new(10.0, 20.0, 50.0, 60.0),
            landmarks: Some([(20.0, 30.0); 5]),
        };

        let det = candidate.into_detection(0.5, 1000.0, 1000.0);

        assert_eq!(det.bbox, BoundingBox::new(20.0, 40.0, 100.0, 120.0));
        assert_relative_eq!(det.confidence, 0.9);
        assert_eq!(det.landmarks.unwrap()[0], (40.0, 60.0));
        assert_relative_eq!(det.visible_fraction, 1.0);
    }

    #[test]
    fn test_into_detection_clamps_to_frame() {
        let candidate = Candidate {
            score: 0.8,
            bbox: BoundingBox::new(-5.0, -5.0, 120.0, 90.0),
            landmarks: Some([(150.0, -3.0); 5]),
        };

        let det = candidate.into_detection(1.0, 100.0, 80.0);

        assert_eq!(det.bbox, BoundingBox::new(0.0, 0.0, 100.0, 80.0));
        assert_eq!(det.landmarks.unwrap()[4], (99.0, 0.0));
        // full box 125x95, visible 100x80
        assert_relative_eq!(det.visible_fraction, 8000.0 / 11875.0);
    }

    #[test]
    fn test_into_detection_without_landmarks() {
        let candidate = Candidate {
            score: 0.6,
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            landmarks: None,
        };
        assert!(candidate.into_detection(1.0, 100.0, 100.0).landmarks.is_none());
    }
}

use serde::{Deserialize, Serialize};

use crate::detection::domain::candidate::Detection;
use crate::shared::config::DetectorConfig;

const MIN_VISIBLE_FRACTION: f64 = 0.5;
const EDGE_MARGIN_RATIO: f64 = 0.05;
const MIN_EDGE_MARGIN_PX: f64 = 10.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryVerdict {
    /// Geometry gives no reason to reject; run the model.
    Pass,
    TooSmall,
    /// Face is mostly clipped or touches the frame border.
    Spoof,
}

/// Rejects faces whose placement in the frame makes a liveness decision
/// unreliable, without running a model.
///
/// Disabled when `min_face_size` is zero.
#[derive(Clone, Copy, Debug)]
pub struct GeometryGate {
    min_face_size: f64,
}

impl GeometryGate {
    pub fn new(min_face_size: f64) -> Self {
        Self { min_face_size }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(config.min_face_size)
    }

    pub fn is_enabled(&self) -> bool {
        self.min_face_size > 0.0
    }

    pub fn assess(&self, detection: &Detection, frame_width: f64, frame_height: f64) -> GeometryVerdict {
        if !self.is_enabled() {
            return GeometryVerdict::Pass;
        }

        let bbox = &detection.bbox;
        if bbox.width() < self.min_face_size || bbox.height() < self.min_face_size {
            return GeometryVerdict::TooSmall;
        }

        if detection.visible_fraction < MIN_VISIBLE_FRACTION {
            return GeometryVerdict::Spoof;
        }

        let margin_x = (frame_width * EDGE_MARGIN_RATIO).max(MIN_EDGE_MARGIN_PX);
        let margin_y = (frame_height * EDGE_MARGIN_RATIO).max(MIN_EDGE_MARGIN_PX);
        let near_edge = |x: f64, y: f64| {
            x < margin_x || y < margin_y || x > frame_width - margin_x || y > frame_height - margin_y
        };

        let box_near_edge = bbox.x1 < margin_x
            || bbox.y1 < margin_y
            || bbox.x2 > frame_width - margin_x
            || bbox.y2 > frame_height - margin_y;
        let landmarks_near_edge = detection
            .landmarks
            .map(|points| points.iter().any(|&(x, y)| near_edge(x, y)))
            .unwrap_or(false);

        if box_near_edge || landmarks_near_edge {
            GeometryVerdict::Spoof
        } else {
            GeometryVerdict::Pass
        }
    }
}

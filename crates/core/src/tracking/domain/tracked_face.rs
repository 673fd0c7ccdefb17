use std::fmt;

use serde::{Deserialize, Serialize};

use crate::shared::bbox::BoundingBox;

/// Opaque track handle, assigned monotonically from 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u32);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One face as seen in the current frame, after recognition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    pub bbox: BoundingBox,
    pub confidence: f64,
    #[serde(default)]
    pub person_id: Option<String>,
    #[serde(default)]
    pub similarity: f64,
}

impl FaceObservation {
    pub fn new(bbox: BoundingBox, confidence: f64) -> Self {
        Self {
            bbox,
            confidence,
            person_id: None,
            similarity: 0.0,
        }
    }

    pub fn identified(mut self, person_id: impl Into<String>, similarity: f64) -> Self {
        self.person_id = Some(person_id.into());
        self.similarity = similarity;
        self
    }
}

/// A face followed across frames. `bbox` and `confidence` are smoothed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackedFace {
    pub track_id: TrackId,
    pub person_id: Option<String>,
    pub confidence: f64,
    pub similarity: f64,
    pub bbox: BoundingBox,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    pub detection_count: u32,
    pub stability_score: f64,
    pub is_stable: bool,
}

impl TrackedFace {
    pub(crate) fn start(track_id: TrackId, observation: &FaceObservation, now_ms: u64) -> Self {
        Self {
            track_id,
            person_id: observation.person_id.clone(),
            confidence: observation.confidence,
            similarity: observation.similarity,
            bbox: observation.bbox,
            first_seen_ms: now_ms,
            last_seen_ms: now_ms,
            detection_count: 1,
            stability_score: 0.0,
            is_stable: false,
        }
    }

    pub fn is_identified(&self) -> bool {
        self.person_id.is_some()
    }
}

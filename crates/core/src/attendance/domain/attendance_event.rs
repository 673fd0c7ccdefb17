use serde::{Deserialize, Serialize};

use crate::shared::bbox::BoundingBox;

/// Emitted once per presence episode, when a session first sees its person.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub person_id: String,
    pub timestamp_ms: u64,
    pub confidence: f64,
    pub bbox: BoundingBox,
    pub session_id: String,
}

/// Per-sighting measurements handed to the deduplication engine.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionMetrics {
    pub timestamp_ms: u64,
    pub confidence: f64,
    pub similarity: f64,
    pub bbox: BoundingBox,
}

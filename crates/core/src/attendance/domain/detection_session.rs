use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::shared::bbox::BoundingBox;
use crate::shared::config::QualityWeights;

use super::attendance_event::DetectionMetrics;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionDetection {
    pub timestamp_ms: u64,
    pub confidence: f64,
    pub similarity: f64,
    pub bbox: BoundingBox,
    pub quality_score: f64,
}

/// `confidence·wC + similarity·wS + min(area / reference_area, 1)·wZ`
pub fn quality_score(metrics: &DetectionMetrics, weights: &QualityWeights, reference_area: f64) -> f64 {
    let normalized_size = if reference_area > 0.0 {
        (metrics.bbox.area() / reference_area).min(1.0)
    } else {
        0.0
    };
    metrics.confidence * weights.confidence
        + metrics.similarity * weights.similarity
        + normalized_size * weights.size
}

/// One continuous presence episode for a person.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionSession {
    pub session_id: String,
    pub person_id: String,
    pub history: VecDeque<SessionDetection>,
    pub first_detected_ms: u64,
    pub last_detected_ms: u64,
    pub best_detection: Option<SessionDetection>,
    logged: bool,
}

impl DetectionSession {
    pub fn new(person_id: &str, timestamp_ms: u64) -> Self {
        Self {
            session_id: format!("{person_id}_{timestamp_ms}"),
            person_id: person_id.to_string(),
            history: VecDeque::new(),
            first_detected_ms: timestamp_ms,
            last_detected_ms: timestamp_ms,
            best_detection: None,
            logged: false,
        }
    }

    pub fn logged(&self) -> bool {
        self.logged
    }

    /// Flip `logged` to true. Returns whether this call did the flip.
    pub fn mark_logged(&mut self) -> bool {
        !std::mem::replace(&mut self.logged, true)
    }

    /// Whether a sighting at `timestamp_ms` continues this session.
    pub fn is_open_at(&self, timestamp_ms: u64, timeout_ms: u64) -> bool {
        timestamp_ms.saturating_sub(self.last_detected_ms) < timeout_ms
    }

    pub fn record(&mut self, detection: SessionDetection, max_history: usize) {
        if self
            .best_detection
            .map_or(true, |best| detection.quality_score > best.quality_score)
        {
            self.best_detection = Some(detection);
        }

        self.last_detected_ms = self.last_detected_ms.max(detection.timestamp_ms);
        self.history.push_back(detection);
        while self.history.len() > max_history.max(1) {
            self.history.pop_front();
        }
    }

    pub fn detection_count(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn metrics(confidence: f64, similarity: f64, side: f64) -> DetectionMetrics {
        DetectionMetrics {
            timestamp_ms: 0,
            confidence,
            similarity,
            bbox: BoundingBox::from_xywh(0.0, 0.0, side, side),
        }
    }

    fn detection(timestamp_ms: u64, quality_score: f64) -> SessionDetection {
        SessionDetection {
            timestamp_ms,
            confidence: 0.9,
            similarity: 0.8,
            bbox: BoundingBox::from_xywh(0.0, 0.0, 100.0, 100.0),
            quality_score,
        }
    }

    #[rstest]
    #[case::full_size(metrics(0.9, 0.8, 100.0), 0.4 * 0.9 + 0.4 * 0.8 + 0.2)]
    #[case::half_size(metrics(0.5, 0.5, 50.0), 0.2 + 0.2 + 0.2 * 0.25)]
    #[case::oversized_is_capped(metrics(1.0, 1.0, 500.0), 1.0)]
    fn test_quality_score(#[case] m: DetectionMetrics, #[case] expected: f64) {
        let q = quality_score(&m, &QualityWeights::default(), 10_000.0);
        assert_relative_eq!(q, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_session_id_format() {
        let session = DetectionSession::new("p1", 1234);
        assert_eq!(session.session_id, "p1_1234");
        assert!(!session.logged());
    }

    #[test]
    fn test_mark_logged_only_flips_once() {
        let mut session = DetectionSession::new("p1", 0);
        assert!(session.mark_logged());
        assert!(!session.mark_logged());
        assert!(session.logged());
    }

    #[test]
    fn test_best_detection_tracks_highest_quality() {
        let mut session = DetectionSession::new("p1", 0);
        session.record(detection(0, 0.5), 100);
        session.record(detection(10, 0.9), 100);
        session.record(detection(20, 0.7), 100);

        assert_eq!(session.best_detection.unwrap().timestamp_ms, 10);
        assert_eq!(session.last_detected_ms, 20);
    }

    #[test]
    fn test_history_is_capped_but_best_survives() {
        let mut session = DetectionSession::new("p1", 0);
        session.record(detection(0, 0.99), 3);
        for t in 1..10 {
            session.record(detection(t, 0.1), 3);
        }

        assert_eq!(session.detection_count(), 3);
        assert_eq!(session.history.front().unwrap().timestamp_ms, 7);
        assert_eq!(session.best_detection.unwrap().timestamp_ms, 0);
    }

    #[rstest]
    #[case(29_999, true)]
    #[case(30_000, false)]
    #[case(40_000, false)]
    fn test_open_window(#[case] at: u64, #[case] open: bool) {
        let session = DetectionSession::new("p1", 0);
        assert_eq!(session.is_open_at(at, 30_000), open);
    }
}

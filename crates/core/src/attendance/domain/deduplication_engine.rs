/// Turns a stream of per-frame recognitions into at most one attendance
/// event per presence episode.
///
/// A sighting joins the person's open session when it arrives within
/// `session_timeout_ms` of the previous one; otherwise a fresh session is
/// opened. Sessions log on their first sighting and never again.
use std::collections::{BTreeMap, HashMap};

use crate::shared::config::AttendanceConfig;
use crate::shared::sweep::Sweepable;

use super::attendance_event::{AttendanceEvent, DetectionMetrics};
use super::detection_session::{quality_score, DetectionSession, SessionDetection};

pub struct DeduplicationEngine {
    config: AttendanceConfig,
    sessions: BTreeMap<String, DetectionSession>,
    /// Latest session per person.
    latest: HashMap<String, String>,
}

impl DeduplicationEngine {
    pub fn new(config: AttendanceConfig) -> Self {
        Self {
            config,
            sessions: BTreeMap::new(),
            latest: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AttendanceConfig {
        &self.config
    }

    /// Record one sighting. Returns an event only when this sighting opens
    /// a session that has not logged yet.
    pub fn process(&mut self, person_id: &str, metrics: DetectionMetrics) -> Option<AttendanceEvent> {
        if person_id.is_empty() {
            return None;
        }

        let timestamp = metrics.timestamp_ms;
        let session_id = self.open_session_for(person_id, timestamp);
        let detection = SessionDetection {
            timestamp_ms: timestamp,
            confidence: metrics.confidence,
            similarity: metrics.similarity,
            bbox: metrics.bbox,
            quality_score: quality_score(
                &metrics,
                &self.config.quality_weights,
                self.config.reference_face_area,
            ),
        };

        let max_history = self.config.max_history;
        let session = self.sessions.get_mut(&session_id)?;
        session.record(detection, max_history);

        if !session.mark_logged() {
            return None;
        }

        log::info!(
            "attendance logged for {person_id} (session {}, confidence {:.2})",
            session.session_id,
            metrics.confidence
        );
        Some(AttendanceEvent {
            person_id: person_id.to_string(),
            timestamp_ms: timestamp,
            confidence: metrics.confidence,
            bbox: metrics.bbox,
            session_id: session.session_id.clone(),
        })
    }

    /// Delete sessions idle for more than twice the session timeout,
    /// logged or not. Returns how many were removed.
    pub fn sweep(&mut self, now_ms: u64) -> usize {
        let horizon = self.config.session_timeout_ms.saturating_mul(2);
        let before = self.sessions.len();
        self.sessions
            .retain(|_, s| now_ms.saturating_sub(s.last_detected_ms) <= horizon);
        let sessions = &self.sessions;
        self.latest.retain(|_, id| sessions.contains_key(id));

        let removed = before - self.sessions.len();
        if removed > 0 {
            log::debug!("swept {removed} session(s), {} remaining", self.sessions.len());
        }
        removed
    }

    /// Returns whether a session was removed. Unknown ids are a no-op.
    pub fn remove_session(&mut self, session_id: &str) -> bool {
        let Some(session) = self.sessions.remove(session_id) else {
            return false;
        };
        if self.latest.get(&session.person_id).map(String::as_str) == Some(session_id) {
            self.latest.remove(&session.person_id);
        }
        true
    }

    pub fn reset(&mut self) {
        self.sessions.clear();
        self.latest.clear();
    }

    pub fn sessions(&self) -> &BTreeMap<String, DetectionSession> {
        &self.sessions
    }

    pub fn session(&self, session_id: &str) -> Option<&DetectionSession> {
        self.sessions.get(session_id)
    }

    pub fn active_session(&self, person_id: &str) -> Option<&DetectionSession> {
        self.latest.get(person_id).and_then(|id| self.sessions.get(id))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn open_session_for(&mut self, person_id: &str, timestamp_ms: u64) -> String {
        let timeout = self.config.session_timeout_ms;
        if let Some(id) = self.latest.get(person_id) {
            if self
                .sessions
                .get(id)
                .is_some_and(|s| s.is_open_at(timestamp_ms, timeout))
            {
                return id.clone();
            }
        }

        let session = DetectionSession::new(person_id, timestamp_ms);
        let id = session.session_id.clone();
        log::info!("new session {id} for {person_id}");
        self.sessions.insert(id.clone(), session);
        self.latest.insert(person_id.to_string(), id.clone());
        id
    }
}

impl Sweepable for DeduplicationEngine {
    fn label(&self) -> &'static str {
        "sessions"
    }

    fn sweep(&mut self, now_ms: u64) -> usize {
        DeduplicationEngine::sweep(self, now_ms)
    }
}

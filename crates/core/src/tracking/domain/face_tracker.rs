/// Multi-face tracker with weighted-distance association.
///
/// Each observation is matched greedily, in input order, to the closest
/// unclaimed track. Distance mixes center offset, relative size change,
/// confidence change and an identity term that pulls same-person pairs
/// together and pushes different-person pairs apart. Matched tracks are
/// smoothed with an exponential moving average.
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::shared::config::TrackerConfig;
use crate::shared::sweep::Sweepable;

use super::tracked_face::{FaceObservation, TrackId, TrackedFace};

const PRIMARY_AREA_CAP: f64 = 0.2;

/// Which track an observation landed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackAssignment {
    pub observation: usize,
    pub track_id: TrackId,
    pub created: bool,
}

pub struct FaceTracker {
    config: TrackerConfig,
    tracks: BTreeMap<TrackId, TrackedFace>,
    primary: Option<TrackId>,
    next_id: u32,
}

impl FaceTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: BTreeMap::new(),
            primary: None,
            next_id: 1,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn update(
        &mut self,
        observations: &[FaceObservation],
        frame_width: f64,
        frame_height: f64,
        now_ms: u64,
    ) -> Vec<TrackAssignment> {
        let mut claimed: HashSet<TrackId> = HashSet::with_capacity(observations.len());
        let mut assignments = Vec::with_capacity(observations.len());

        for (index, observation) in observations.iter().enumerate() {
            let assignment = match self.closest_track(observation, &claimed) {
                Some(track_id) => {
                    self.apply_match(track_id, observation, now_ms);
                    TrackAssignment {
                        observation: index,
                        track_id,
                        created: false,
                    }
                }
                None => TrackAssignment {
                    observation: index,
                    track_id: self.create_track(observation, now_ms),
                    created: true,
                },
            };
            claimed.insert(assignment.track_id);
            assignments.push(assignment);
        }

        self.refresh_primary(frame_width, frame_height);
        assignments
    }

    /// Delete tracks unseen for longer than the timeout. Clears the primary
    /// if it was among them.
    pub fn expire(&mut self, now_ms: u64) -> Vec<TrackId> {
        let timeout = self.config.track_timeout_ms;
        let expired: Vec<TrackId> = self
            .tracks
            .values()
            .filter(|t| now_ms.saturating_sub(t.last_seen_ms) > timeout)
            .map(|t| t.track_id)
            .collect();

        for id in &expired {
            self.remove(*id);
        }
        if !expired.is_empty() {
            log::debug!("expired {} track(s), {} active", expired.len(), self.tracks.len());
        }
        expired
    }

    /// Returns whether a track was removed. Removing an unknown id is a no-op.
    pub fn remove(&mut self, id: TrackId) -> bool {
        if self.primary == Some(id) {
            self.primary = None;
        }
        self.tracks.remove(&id).is_some()
    }

    pub fn reset(&mut self) {
        self.tracks.clear();
        self.primary = None;
    }

    pub fn tracks(&self) -> &BTreeMap<TrackId, TrackedFace> {
        &self.tracks
    }

    pub fn get(&self, id: TrackId) -> Option<&TrackedFace> {
        self.tracks.get(&id)
    }

    pub fn primary_id(&self) -> Option<TrackId> {
        self.primary
    }

    pub fn primary(&self) -> Option<&TrackedFace> {
        self.primary.and_then(|id| self.tracks.get(&id))
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    // ── Association ──

    fn closest_track(&self, observation: &FaceObservation, claimed: &HashSet<TrackId>) -> Option<TrackId> {
        let mut best: Option<(TrackId, f64)> = None;
        for (&id, track) in &self.tracks {
            if claimed.contains(&id) {
                continue;
            }
            let distance = match_distance(track, observation, &self.config);
            if !distance.is_finite() || distance >= self.config.max_tracking_distance {
                continue;
            }
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((id, distance));
            }
        }
        best.map(|(id, _)| id)
    }

    fn apply_match(&mut self, id: TrackId, observation: &FaceObservation, now_ms: u64) {
        let alpha = self.config.smoothing_alpha;
        let Some(track) = self.tracks.get_mut(&id) else {
            return;
        };

        track.bbox = track.bbox.blend(&observation.bbox, alpha);
        track.confidence = track.confidence * (1.0 - alpha) + observation.confidence * alpha;
        if observation.person_id.is_some() {
            track.person_id = observation.person_id.clone();
            track.similarity = observation.similarity;
        }
        track.last_seen_ms = now_ms;
        track.detection_count = track.detection_count.saturating_add(1);
        update_stability(track, &self.config);
    }

    fn create_track(&mut self, observation: &FaceObservation, now_ms: u64) -> TrackId {
        let id = TrackId(self.next_id);
        self.next_id += 1;

        let mut track = TrackedFace::start(id, observation, now_ms);
        update_stability(&mut track, &self.config);
        self.tracks.insert(id, track);
        log::debug!("new track {id} at {:?}", observation.bbox);
        id
    }

    // ── Primary selection ──

    fn refresh_primary(&mut self, frame_width: f64, frame_height: f64) {
        let current_holds = self
            .primary()
            .is_some_and(|t| t.is_stable && t.is_identified());
        if current_holds {
            return;
        }

        let frame_area = frame_width * frame_height;
        let mut best: Option<(TrackId, f64)> = None;
        for track in self.tracks.values().filter(|t| t.is_stable) {
            let score = primary_score(track, frame_area);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((track.track_id, score));
            }
        }
        self.primary = best.map(|(id, _)| id);
    }
}

impl Sweepable for FaceTracker {
    fn label(&self) -> &'static str {
        "tracks"
    }

    fn sweep(&mut self, now_ms: u64) -> usize {
        self.expire(now_ms).len()
    }
}

/// Weighted association distance between an existing track and a new
/// observation. Lower is closer; may go negative with a strong identity match.
pub fn match_distance(track: &TrackedFace, observation: &FaceObservation, config: &TrackerConfig) -> f64 {
    let weights = &config.weights;
    let center = track.bbox.center_distance(&observation.bbox);

    let (a, b) = (track.bbox.area(), observation.bbox.area());
    let largest = a.max(b);
    let size_delta = if largest > 0.0 { (a - b).abs() / largest } else { 0.0 };

    let confidence_delta = (track.confidence - observation.confidence).abs();

    let identity = match (&track.person_id, &observation.person_id) {
        (Some(t), Some(o)) if t == o => config.identity_match_bonus,
        (Some(_), Some(_)) => config.identity_mismatch_penalty,
        _ => 0.0,
    };

    weights.position * center
        + weights.size * 100.0 * size_delta
        + weights.confidence * 100.0 * confidence_delta
        + identity
}

fn update_stability(track: &mut TrackedFace, config: &TrackerConfig) {
    let min = config.min_detections_for_stability.max(1);
    track.stability_score = (track.detection_count as f64 / min as f64).min(1.0);

    let min_confidence = if track.is_identified() {
        config.min_identified_confidence
    } else {
        config.min_confidence
    };
    track.is_stable = track.detection_count >= min
        && track.stability_score >= config.stability_threshold
        && track.confidence >= min_confidence;
}

fn primary_score(track: &TrackedFace, frame_area: f64) -> f64 {
    let identified = if track.is_identified() { 1.0 } else { 0.0 };
    let area = if frame_area > 0.0 {
        (track.bbox.area() / frame_area).min(PRIMARY_AREA_CAP)
    } else {
        0.0
    };
    0.4 * track.stability_score + 0.3 * track.confidence + 0.3 * identified + area
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::bbox::BoundingBox;
    use approx::assert_relative_eq;
    use rstest::rstest;

    const W: f64 = 640.0;
    const H: f64 = 480.0;

    fn tracker() -> FaceTracker {
        FaceTracker::new(TrackerConfig::default())
    }

    fn obs(x: f64, y: f64, confidence: f64) -> FaceObservation {
        FaceObservation::new(BoundingBox::from_xywh(x, y, 100.0, 100.0), confidence)
    }

    // ── Association ──

    #[test]
    fn test_new_observations_get_unique_ids() {
        let mut t = tracker();
        let a = t.update(&[obs(10.0, 10.0, 0.9), obs(400.0, 300.0, 0.9)], W, H, 0);

        assert_eq!(a[0].track_id, TrackId(1));
        assert_eq!(a[1].track_id, TrackId(2));
        assert!(a.iter().all(|x| x.created));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_nearby_observation_keeps_track() {
        let mut t = tracker();
        t.update(&[obs(100.0, 100.0, 0.9)], W, H, 0);
        let a = t.update(&[obs(110.0, 105.0, 0.9)], W, H, 33);

        assert_eq!(a[0].track_id, TrackId(1));
        assert!(!a[0].created);
        assert_eq!(t.get(TrackId(1)).unwrap().detection_count, 2);
        assert_eq!(t.get(TrackId(1)).unwrap().last_seen_ms, 33);
    }

    #[test]
    fn test_far_observation_starts_new_track() {
        let mut t = tracker();
        t.update(&[obs(0.0, 0.0, 0.9)], W, H, 0);
        // center distance 500 * 0.4 = 200 > 100
        let a = t.update(&[obs(300.0, 400.0, 0.9)], W, H, 33);
        assert!(a[0].created);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_track_claimed_once_per_frame() {
        let mut t = tracker();
        t.update(&[obs(100.0, 100.0, 0.9)], W, H, 0);
        let a = t.update(&[obs(100.0, 100.0, 0.9), obs(105.0, 100.0, 0.9)], W, H, 33);

        assert_eq!(a[0].track_id, TrackId(1));
        assert_eq!(a[1].track_id, TrackId(2));
        assert!(a[1].created);
    }

    #[test]
    fn test_equidistant_tie_goes_to_lowest_track_id() {
        let mut t = tracker();
        t.update(&[obs(100.0, 100.0, 0.9), obs(140.0, 100.0, 0.9)], W, H, 0);
        // Midway between both tracks
        let a = t.update(&[obs(120.0, 100.0, 0.9)], W, H, 33);
        assert_eq!(a[0].track_id, TrackId(1));
    }

    #[test]
    fn test_identity_match_beats_closer_stranger() {
        let mut t = tracker();
        t.update(
            &[
                obs(100.0, 100.0, 0.9).identified("bob", 0.8),
                obs(200.0, 100.0, 0.9).identified("alice", 0.8),
            ],
            W,
            H,
            0,
        );
        // Closer to bob's track, but recognized as alice
        let a = t.update(&[obs(130.0, 100.0, 0.9).identified("alice", 0.8)], W, H, 33);
        assert_eq!(a[0].track_id, TrackId(2));
    }

    #[test]
    fn test_unmatched_track_keeps_last_seen() {
        let mut t = tracker();
        t.update(&[obs(100.0, 100.0, 0.9)], W, H, 0);
        t.update(&[], W, H, 500);
        assert_eq!(t.get(TrackId(1)).unwrap().last_seen_ms, 0);
    }

    #[test]
    fn test_non_finite_observation_never_joins_a_track() {
        let mut t = tracker();
        t.update(&[obs(100.0, 100.0, 0.9)], W, H, 0);
        let before = t.get(TrackId(1)).unwrap().bbox;

        let a = t.update(&[obs(f64::NAN, 100.0, 0.9)], W, H, 33);

        assert!(a[0].created);
        assert_eq!(a[0].track_id, TrackId(2));
        assert_eq!(t.get(TrackId(1)).unwrap().bbox, before);
    }

    #[rstest]
    #[case::same_person(Some("a"), Some("a"), -50.0)]
    #[case::different_people(Some("a"), Some("b"), 25.0)]
    #[case::unknown_track(None, Some("a"), 0.0)]
    #[case::unknown_observation(Some("a"), None, 0.0)]
    fn test_identity_term(#[case] track_person: Option<&str>, #[case] obs_person: Option<&str>, #[case] expected: f64) {
        let config = TrackerConfig::default();
        let mut observation = obs(0.0, 0.0, 0.9);
        observation.person_id = obs_person.map(String::from);
        let mut track = TrackedFace::start(TrackId(1), &obs(0.0, 0.0, 0.9), 0);
        track.person_id = track_person.map(String::from);

        assert_relative_eq!(match_distance(&track, &observation, &config), expected);
    }

    #[test]
    fn test_distance_weights() {
        let config = TrackerConfig::default();
        let track = TrackedFace::start(TrackId(1), &obs(0.0, 0.0, 0.9), 0);
        // center moves 30 + 40 → 50; area 100x100 vs 50x100 → 0.5; conf 0.9 vs 0.8
        let mut observation = FaceObservation::new(BoundingBox::from_xywh(55.0, 40.0, 50.0, 100.0), 0.8);
        observation.similarity = 0.0;

        let expected = 0.4 * 50.0 + 0.3 * 100.0 * 0.5 + 0.3 * 100.0 * 0.1;
        assert_relative_eq!(match_distance(&track, &observation, &config), expected, epsilon = 1e-9);
    }

    // ── Smoothing ──

    #[test]
    fn test_smoothing_is_convex_blend() {
        let mut t = tracker();
        t.update(&[obs(100.0, 100.0, 0.8)], W, H, 0);
        t.update(&[obs(110.0, 100.0, 0.9)], W, H, 33);

        let track = t.get(TrackId(1)).unwrap();
        assert_relative_eq!(track.bbox.x1, 100.0 * 0.3 + 110.0 * 0.7, epsilon = 1e-9);
        assert_relative_eq!(track.confidence, 0.8 * 0.3 + 0.9 * 0.7, epsilon = 1e-9);
        assert!(track.bbox.x1 >= 100.0 && track.bbox.x1 <= 110.0);
    }

    // ── Stability ──

    #[test]
    fn test_stability_never_before_min_detections() {
        let mut t = tracker();
        for i in 0..4 {
            t.update(&[obs(100.0, 100.0, 0.99)], W, H, i * 33);
            let track = t.get(TrackId(1)).unwrap();
            assert!(!track.is_stable, "stable after {} detections", track.detection_count);
        }
        t.update(&[obs(100.0, 100.0, 0.99)], W, H, 200);
        let track = t.get(TrackId(1)).unwrap();
        assert_eq!(track.detection_count, 5);
        assert_relative_eq!(track.stability_score, 1.0);
        assert!(track.is_stable);
    }

    #[test]
    fn test_identified_track_needs_higher_confidence() {
        let mut t = tracker();
        for i in 0..5 {
            t.update(&[obs(100.0, 100.0, 0.72).identified("p1", 0.9)], W, H, i * 33);
        }
        assert!(!t.get(TrackId(1)).unwrap().is_stable);

        let mut anon = tracker();
        for i in 0..5 {
            anon.update(&[obs(100.0, 100.0, 0.72)], W, H, i * 33);
        }
        assert!(anon.get(TrackId(1)).unwrap().is_stable);
    }

    // ── Expiry & primary ──

    fn stable_primary() -> FaceTracker {
        let mut t = tracker();
        for i in 0..5 {
            t.update(&[obs(100.0, 100.0, 0.95).identified("p1", 0.9)], W, H, i * 100);
        }
        t
    }

    #[test]
    fn test_primary_selected_once_stable() {
        let t = stable_primary();
        assert_eq!(t.primary_id(), Some(TrackId(1)));
        assert_eq!(t.primary().unwrap().person_id.as_deref(), Some("p1"));
    }

    #[test]
    fn test_expired_primary_is_cleared() {
        let mut t = stable_primary();
        // last seen at 400, timeout 2000
        assert!(t.expire(2_400).is_empty());
        assert_eq!(t.expire(2_401), vec![TrackId(1)]);
        assert!(t.is_empty());
        assert_eq!(t.primary_id(), None);
        assert!(t.primary().is_none());
    }

    #[test]
    fn test_primary_prefers_identified_track() {
        let mut t = tracker();
        for i in 0..5 {
            t.update(
                &[obs(100.0, 100.0, 0.95), obs(400.0, 300.0, 0.95).identified("p2", 0.9)],
                W,
                H,
                i * 100,
            );
        }
        assert_eq!(t.primary_id(), Some(TrackId(2)));
    }

    #[test]
    fn test_remove_and_reset_are_idempotent() {
        let mut t = stable_primary();
        assert!(t.remove(TrackId(1)));
        assert!(!t.remove(TrackId(1)));
        assert_eq!(t.primary_id(), None);

        t.reset();
        t.reset();
        assert!(t.is_empty());
    }

    #[test]
    fn test_ids_keep_increasing_after_reset() {
        let mut t = tracker();
        t.update(&[obs(100.0, 100.0, 0.9)], W, H, 0);
        t.reset();
        let a = t.update(&[obs(100.0, 100.0, 0.9)], W, H, 10);
        assert_eq!(a[0].track_id, TrackId(2));
    }

    #[test]
    fn test_sweep_reports_removed_count() {
        let mut t = tracker();
        t.update(&[obs(0.0, 0.0, 0.9), obs(400.0, 300.0, 0.9)], W, H, 0);
        assert_eq!(t.sweep(5_000), 2);
        assert_eq!(t.label(), "tracks");
    }
}

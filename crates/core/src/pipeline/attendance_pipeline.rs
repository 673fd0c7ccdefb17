/// The attendance frame loop.
///
/// `detect → geometry gate → liveness → recognize → track → temporal check
/// → deduplicate`, one frame at a time. The tracker and the deduplication
/// engine sit behind their own mutexes so background sweepers can expire
/// entries between frames.
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attendance::domain::attendance_event::{AttendanceEvent, DetectionMetrics};
use crate::attendance::domain::deduplication_engine::DeduplicationEngine;
use crate::detection::domain::candidate::Detection;
use crate::detection::domain::face_detector::FaceDetector;
use crate::liveness::domain::geometry_gate::{GeometryGate, GeometryVerdict};
use crate::liveness::domain::liveness_gate::LivenessGate;
use crate::liveness::domain::liveness_result::{LivenessResult, LivenessStatus};
use crate::liveness::domain::temporal_analyzer::{TemporalAnalyzer, TemporalVerdict};
use crate::shared::bbox::BoundingBox;
use crate::shared::clock::Clock;
use crate::shared::config::{ConfigError, EngineConfig};
use crate::shared::frame::Frame;
use crate::tracking::domain::face_tracker::FaceTracker;
use crate::tracking::domain::tracked_face::{FaceObservation, TrackId};

use super::face_recognizer::FaceRecognizer;
use super::infrastructure::periodic_sweeper::PeriodicSweeper;
use super::pipeline_logger::{NullPipelineLogger, PipelineLogger};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    Input(String),
    #[error("face detection failed: {0}")]
    Detection(String),
    #[error("face recognition failed: {0}")]
    Recognition(String),
    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// What happened to one face in a processed frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceReport {
    pub track_id: TrackId,
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub person_id: Option<String>,
    pub similarity: f64,
    pub liveness: LivenessStatus,
    pub liveness_confidence: Option<f64>,
    pub temporal: Option<TemporalVerdict>,
    pub stable: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub frame_index: usize,
    pub timestamp_ms: u64,
    pub skipped: bool,
    pub faces: Vec<FaceReport>,
    pub events: Vec<AttendanceEvent>,
    pub primary: Option<TrackId>,
}

impl FrameReport {
    fn skipped(frame_index: usize, timestamp_ms: u64) -> Self {
        Self {
            frame_index,
            timestamp_ms,
            skipped: true,
            faces: Vec::new(),
            events: Vec::new(),
            primary: None,
        }
    }
}

struct GatedFace {
    observation: FaceObservation,
    liveness: LivenessStatus,
    result: Option<LivenessResult>,
    temporal: Option<TemporalVerdict>,
}

impl GatedFace {
    fn unchecked(observation: FaceObservation) -> Self {
        Self {
            observation,
            liveness: LivenessStatus::Unchecked,
            result: None,
            temporal: None,
        }
    }
}

pub struct AttendancePipeline {
    config: EngineConfig,
    detector: Option<Box<dyn FaceDetector>>,
    recognizer: Option<Box<dyn FaceRecognizer>>,
    liveness: Option<LivenessGate>,
    geometry: GeometryGate,
    temporal: TemporalAnalyzer,
    tracker: Arc<Mutex<FaceTracker>>,
    engine: Arc<Mutex<DeduplicationEngine>>,
    logger: Box<dyn PipelineLogger>,
    frames_seen: usize,
}

impl AttendancePipeline {
    pub fn new(config: EngineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            detector: None,
            recognizer: None,
            liveness: None,
            geometry: GeometryGate::from_config(&config.detector),
            temporal: TemporalAnalyzer::new(config.liveness.temporal.clone()),
            tracker: Arc::new(Mutex::new(FaceTracker::new(config.tracker.clone()))),
            engine: Arc::new(Mutex::new(DeduplicationEngine::new(config.attendance.clone()))),
            logger: Box::new(NullPipelineLogger),
            frames_seen: 0,
            config,
        })
    }

    pub fn with_detector(mut self, detector: Box<dyn FaceDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn with_recognizer(mut self, recognizer: Box<dyn FaceRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    /// Attach a liveness gate. Without one, faces that pass the geometry
    /// gate are reported as unchecked.
    pub fn with_liveness(mut self, gate: LivenessGate) -> Self {
        self.liveness = Some(gate);
        self
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tracker_handle(&self) -> Arc<Mutex<FaceTracker>> {
        Arc::clone(&self.tracker)
    }

    pub fn engine_handle(&self) -> Arc<Mutex<DeduplicationEngine>> {
        Arc::clone(&self.engine)
    }

    /// Start background expiry for tracks and sessions on their configured
    /// intervals. Dropping the returned sweepers stops them.
    pub fn spawn_sweepers(&self, clock: Arc<dyn Clock>) -> Vec<PeriodicSweeper> {
        vec![
            PeriodicSweeper::spawn(
                self.tracker_handle(),
                Duration::from_millis(self.config.pipeline.track_sweep_interval_ms),
                Arc::clone(&clock),
            ),
            PeriodicSweeper::spawn(
                self.engine_handle(),
                Duration::from_millis(self.config.attendance.sweep_interval_ms),
                clock,
            ),
        ]
    }

    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameReport, PipelineError> {
        let index = frame.index();
        let now = frame.timestamp_ms();
        let seen = self.frames_seen;
        self.frames_seen += 1;

        if seen % self.config.pipeline.frame_skip.max(1) != 0 {
            self.logger.frame(index, true);
            return Ok(FrameReport::skipped(index, now));
        }
        if frame.is_empty() {
            return Err(PipelineError::Input(format!(
                "empty frame {index} ({}x{})",
                frame.width(),
                frame.height()
            )));
        }

        let detector = self
            .detector
            .as_mut()
            .ok_or_else(|| PipelineError::Input("no face detector configured".into()))?;
        let start = Instant::now();
        let detections = detector
            .detect(frame)
            .map_err(|e| PipelineError::Detection(e.to_string()))?;
        self.logger.timing("detect", elapsed_ms(start));
        log::debug!("frame {index}: {} face(s)", detections.len());

        let faces = self.gate_and_recognize(frame, detections)?;
        let report = self.track_and_deduplicate(
            index,
            faces,
            frame.width() as f64,
            frame.height() as f64,
            now,
        )?;
        self.logger.frame(index, false);
        Ok(report)
    }

    /// Track and deduplicate faces that were detected and recognized
    /// elsewhere. Observations are treated as live.
    pub fn ingest(
        &mut self,
        observations: &[FaceObservation],
        frame_width: u32,
        frame_height: u32,
        timestamp_ms: u64,
    ) -> Result<FrameReport, PipelineError> {
        if frame_width == 0 || frame_height == 0 {
            return Err(PipelineError::Input(format!(
                "frame size {frame_width}x{frame_height}"
            )));
        }
        let index = self.frames_seen;
        self.frames_seen += 1;

        let faces = observations
            .iter()
            .cloned()
            .map(GatedFace::unchecked)
            .collect();
        let report = self.track_and_deduplicate(
            index,
            faces,
            frame_width as f64,
            frame_height as f64,
            timestamp_ms,
        )?;
        self.logger.frame(index, false);
        Ok(report)
    }

    /// Expire stale tracks and sessions at `now_ms` on the calling thread.
    /// Returns `(tracks_removed, sessions_removed)`.
    pub fn sweep(&mut self, now_ms: u64) -> Result<(usize, usize), PipelineError> {
        let tracks = {
            let mut tracker = lock(&self.tracker, "tracker")?;
            let expired = tracker.expire(now_ms);
            for id in &expired {
                self.temporal.clear_track(id.0);
            }
            expired.len()
        };
        let sessions = lock(&self.engine, "sessions")?.sweep(now_ms);
        Ok((tracks, sessions))
    }

    /// Drop all tracks, sessions and liveness history immediately.
    pub fn reset(&mut self) -> Result<(), PipelineError> {
        lock(&self.tracker, "tracker")?.reset();
        lock(&self.engine, "sessions")?.reset();
        self.temporal.clear_all();
        self.frames_seen = 0;
        log::info!("attendance pipeline reset");
        Ok(())
    }

    pub fn summary(&self) {
        self.logger.summary();
    }

    // ── Per-face gating ──

    fn gate_and_recognize(
        &mut self,
        frame: &Frame,
        detections: Vec<Detection>,
    ) -> Result<Vec<GatedFace>, PipelineError> {
        let mut faces = Vec::with_capacity(detections.len());
        let mut liveness_ms = 0.0;
        let mut recognize_ms = 0.0;

        for detection in detections {
            let start = Instant::now();
            let (liveness, result) = self.assess_liveness(frame, &detection);
            liveness_ms += elapsed_ms(start);

            let mut observation = FaceObservation::new(detection.bbox, detection.confidence);
            if liveness.admits() {
                if let Some(recognizer) = self.recognizer.as_mut() {
                    let start = Instant::now();
                    let recognition = recognizer
                        .recognize(frame, &detection)
                        .map_err(|e| PipelineError::Recognition(e.to_string()))?;
                    recognize_ms += elapsed_ms(start);
                    if let Some(r) = recognition {
                        observation = observation.identified(r.person_id, r.similarity);
                    }
                }
            }

            faces.push(GatedFace {
                observation,
                liveness,
                result,
                temporal: None,
            });
        }

        self.logger.timing("liveness", liveness_ms);
        self.logger.timing("recognize", recognize_ms);
        Ok(faces)
    }

    fn assess_liveness(
        &mut self,
        frame: &Frame,
        detection: &Detection,
    ) -> (LivenessStatus, Option<LivenessResult>) {
        match self
            .geometry
            .assess(detection, frame.width() as f64, frame.height() as f64)
        {
            GeometryVerdict::TooSmall => return (LivenessStatus::TooSmall, None),
            GeometryVerdict::Spoof => return (LivenessStatus::Spoof, None),
            GeometryVerdict::Pass => {}
        }

        if !self.config.liveness.enabled {
            return (LivenessStatus::Unchecked, None);
        }
        let Some(gate) = self.liveness.as_mut() else {
            return (LivenessStatus::Unchecked, None);
        };

        match gate.check(frame, &detection.bbox) {
            Ok(result) if result.is_live => (LivenessStatus::Live, Some(result)),
            Ok(result) => (LivenessStatus::Spoof, Some(result)),
            Err(e) => {
                log::warn!("liveness check failed, treating face as spoof: {e}");
                (LivenessStatus::Error, None)
            }
        }
    }

    // ── Tracking & attendance ──

    fn track_and_deduplicate(
        &mut self,
        frame_index: usize,
        mut faces: Vec<GatedFace>,
        frame_width: f64,
        frame_height: f64,
        now_ms: u64,
    ) -> Result<FrameReport, PipelineError> {
        let observations: Vec<FaceObservation> =
            faces.iter().map(|f| f.observation.clone()).collect();

        // Lock both before mutating either.
        let tracker_handle = Arc::clone(&self.tracker);
        let engine_handle = Arc::clone(&self.engine);
        let mut tracker = lock(&tracker_handle, "tracker")?;
        let mut engine = lock(&engine_handle, "sessions")?;

        let start = Instant::now();
        let assignments = tracker.update(&observations, frame_width, frame_height, now_ms);
        let stable: Vec<bool> = assignments
            .iter()
            .map(|a| tracker.get(a.track_id).is_some_and(|t| t.is_stable))
            .collect();
        self.temporal
            .retain(|id| tracker.get(TrackId(id)).is_some());
        let primary = tracker.primary_id();
        let track_count = tracker.len();
        drop(tracker);

        if self.config.liveness.temporal.enabled {
            for (face, assignment) in faces.iter_mut().zip(&assignments) {
                let Some(result) = face.result else {
                    continue;
                };
                let track = assignment.track_id.0;
                self.temporal.update(
                    track,
                    result.live_probability,
                    result.spoof_probability,
                    now_ms,
                );
                let analysis = self.temporal.analyze(track);
                face.temporal = Some(analysis.verdict);
                if analysis.verdict == TemporalVerdict::Spoof && face.liveness == LivenessStatus::Live {
                    log::debug!(
                        "track {} overridden to spoof ({:?})",
                        assignment.track_id,
                        analysis.reason
                    );
                    face.liveness = LivenessStatus::Spoof;
                }
            }
        }
        self.logger.timing("track", elapsed_ms(start));

        let start = Instant::now();
        let require_stable = self.config.pipeline.require_stable_track;
        let mut events = Vec::new();
        for (face, &is_stable) in faces.iter().zip(&stable) {
            if !face.liveness.admits() || (require_stable && !is_stable) {
                continue;
            }
            let Some(person_id) = face.observation.person_id.as_deref() else {
                continue;
            };
            let metrics = DetectionMetrics {
                timestamp_ms: now_ms,
                confidence: face.observation.confidence,
                similarity: face.observation.similarity,
                bbox: face.observation.bbox,
            };
            if let Some(event) = engine.process(person_id, metrics) {
                events.push(event);
            }
        }
        let session_count = engine.len();
        drop(engine);
        self.logger.timing("attendance", elapsed_ms(start));

        self.logger.metric("faces", faces.len() as f64);
        self.logger.metric("tracks", track_count as f64);
        self.logger.metric("sessions", session_count as f64);
        for event in &events {
            self.logger.attendance(event);
        }

        let faces = faces
            .into_iter()
            .zip(assignments.iter().zip(stable))
            .map(|(face, (assignment, stable))| FaceReport {
                track_id: assignment.track_id,
                bbox: face.observation.bbox,
                confidence: face.observation.confidence,
                person_id: face.observation.person_id,
                similarity: face.observation.similarity,
                liveness: face.liveness,
                liveness_confidence: face.result.map(|r| r.confidence),
                temporal: face.temporal,
                stable,
            })
            .collect();

        Ok(FrameReport {
            frame_index,
            timestamp_ms: now_ms,
            skipped: false,
            faces,
            events,
            primary,
        })
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &'static str) -> Result<MutexGuard<'a, T>, PipelineError> {
    mutex.lock().map_err(|_| PipelineError::LockPoisoned(name))
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

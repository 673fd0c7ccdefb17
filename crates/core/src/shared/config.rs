//! Every tunable of the attendance core in one validated structure.
//!
//! All sections deserialize with `#[serde(default)]`, so a JSON file only
//! needs the keys it overrides.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::constants::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub detector: DetectorConfig,
    pub liveness: LivenessConfig,
    pub tracker: TrackerConfig,
    pub attendance: AttendanceConfig,
    pub pipeline: PipelineSettings,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detector.validate()?;
        self.liveness.validate()?;
        self.tracker.validate()?;
        self.attendance.validate()?;
        self.pipeline.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub input_size: u32,
    pub strides: Vec<u32>,
    pub anchors_per_position: usize,
    pub confidence_threshold: f64,
    pub iou_threshold: f64,
    pub top_k: usize,
    pub anchor_cache_capacity: usize,
    /// Minimum clipped face side in pixels; 0 disables the geometry pre-gate.
    pub min_face_size: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_INPUT_SIZE,
            strides: DEFAULT_STRIDES.to_vec(),
            anchors_per_position: DEFAULT_ANCHORS_PER_POSITION,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            top_k: DEFAULT_TOP_K,
            anchor_cache_capacity: DEFAULT_ANCHOR_CACHE_CAPACITY,
            min_face_size: 0.0,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        unit_interval("detector.confidence_threshold", self.confidence_threshold)?;
        unit_interval("detector.iou_threshold", self.iou_threshold)?;
        positive("detector.input_size", self.input_size as f64)?;
        positive("detector.anchors_per_position", self.anchors_per_position as f64)?;
        positive("detector.top_k", self.top_k as f64)?;
        positive("detector.anchor_cache_capacity", self.anchor_cache_capacity as f64)?;
        non_negative("detector.min_face_size", self.min_face_size)?;
        if self.strides.is_empty() {
            return Err(ConfigError::Invalid("detector.strides must not be empty".into()));
        }
        for &stride in &self.strides {
            if stride == 0 || self.input_size % stride != 0 {
                return Err(ConfigError::Invalid(format!(
                    "stride {stride} does not divide input size {}",
                    self.input_size
                )));
            }
        }
        Ok(())
    }
}

/// Channel order the liveness model was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub enabled: bool,
    pub input_size: u32,
    pub expansion_factor: f64,
    /// Per-channel normalization: `(pixel * scale - mean) / std`.
    pub scale: f32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub channel_order: ChannelOrder,
    pub temporal: TemporalConfig,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            input_size: DEFAULT_LIVENESS_INPUT_SIZE,
            expansion_factor: DEFAULT_CROP_EXPANSION,
            scale: 1.0,
            mean: [0.0; 3],
            std: [1.0; 3],
            channel_order: ChannelOrder::Bgr,
            temporal: TemporalConfig::default(),
        }
    }
}

impl LivenessConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("liveness.input_size", self.input_size as f64)?;
        if self.expansion_factor < 1.0 {
            return Err(ConfigError::OutOfRange {
                field: "liveness.expansion_factor",
                value: self.expansion_factor,
            });
        }
        if self.std.iter().any(|&s| s == 0.0) {
            return Err(ConfigError::Invalid("liveness.std must be non-zero".into()));
        }
        self.temporal.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    pub enabled: bool,
    pub history_size: usize,
    pub history_timeout_ms: u64,
    pub score_variance_threshold: f64,
    pub micro_movement_threshold: f64,
    pub periodicity_threshold: f64,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_size: 5,
            history_timeout_ms: 1_000,
            score_variance_threshold: 0.03,
            micro_movement_threshold: 0.001,
            periodicity_threshold: 0.8,
        }
    }
}

impl TemporalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_size < 3 {
            return Err(ConfigError::OutOfRange {
                field: "liveness.temporal.history_size",
                value: self.history_size as f64,
            });
        }
        non_negative(
            "liveness.temporal.score_variance_threshold",
            self.score_variance_threshold,
        )?;
        non_negative(
            "liveness.temporal.micro_movement_threshold",
            self.micro_movement_threshold,
        )?;
        unit_interval(
            "liveness.temporal.periodicity_threshold",
            self.periodicity_threshold,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchWeights {
    pub position: f64,
    pub size: f64,
    pub confidence: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            position: 0.4,
            size: 0.3,
            confidence: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub max_tracking_distance: f64,
    pub track_timeout_ms: u64,
    pub smoothing_alpha: f64,
    pub min_detections_for_stability: u32,
    pub stability_threshold: f64,
    pub min_confidence: f64,
    pub min_identified_confidence: f64,
    pub weights: MatchWeights,
    /// Added to the distance when both identities agree (negative pulls together).
    pub identity_match_bonus: f64,
    /// Added to the distance when both identities are known and differ.
    pub identity_mismatch_penalty: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_tracking_distance: DEFAULT_MAX_TRACKING_DISTANCE,
            track_timeout_ms: DEFAULT_TRACK_TIMEOUT_MS,
            smoothing_alpha: DEFAULT_SMOOTHING_ALPHA,
            min_detections_for_stability: DEFAULT_MIN_DETECTIONS_FOR_STABILITY,
            stability_threshold: DEFAULT_STABILITY_THRESHOLD,
            min_confidence: 0.7,
            min_identified_confidence: 0.75,
            weights: MatchWeights::default(),
            identity_match_bonus: -50.0,
            identity_mismatch_penalty: 25.0,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("tracker.max_tracking_distance", self.max_tracking_distance)?;
        positive("tracker.track_timeout_ms", self.track_timeout_ms as f64)?;
        positive(
            "tracker.min_detections_for_stability",
            self.min_detections_for_stability as f64,
        )?;
        unit_interval("tracker.smoothing_alpha", self.smoothing_alpha)?;
        unit_interval("tracker.stability_threshold", self.stability_threshold)?;
        unit_interval("tracker.min_confidence", self.min_confidence)?;
        unit_interval(
            "tracker.min_identified_confidence",
            self.min_identified_confidence,
        )?;
        non_negative("tracker.weights.position", self.weights.position)?;
        non_negative("tracker.weights.size", self.weights.size)?;
        non_negative("tracker.weights.confidence", self.weights.confidence)?;
        if self.identity_match_bonus > 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "tracker.identity_match_bonus",
                value: self.identity_match_bonus,
            });
        }
        non_negative(
            "tracker.identity_mismatch_penalty",
            self.identity_mismatch_penalty,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub confidence: f64,
    pub similarity: f64,
    pub size: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            confidence: 0.4,
            similarity: 0.4,
            size: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendanceConfig {
    pub session_timeout_ms: u64,
    pub sweep_interval_ms: u64,
    pub reference_face_area: f64,
    pub quality_weights: QualityWeights,
    pub max_history: usize,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            reference_face_area: DEFAULT_REFERENCE_FACE_AREA,
            quality_weights: QualityWeights::default(),
            max_history: DEFAULT_MAX_SESSION_HISTORY,
        }
    }
}

impl AttendanceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("attendance.session_timeout_ms", self.session_timeout_ms as f64)?;
        positive("attendance.sweep_interval_ms", self.sweep_interval_ms as f64)?;
        positive("attendance.reference_face_area", self.reference_face_area)?;
        positive("attendance.max_history", self.max_history as f64)?;
        non_negative(
            "attendance.quality_weights.confidence",
            self.quality_weights.confidence,
        )?;
        non_negative(
            "attendance.quality_weights.similarity",
            self.quality_weights.similarity,
        )?;
        non_negative("attendance.quality_weights.size", self.quality_weights.size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Process every Nth frame (1 = every frame).
    pub frame_skip: usize,
    /// Only stable tracks may produce attendance.
    pub require_stable_track: bool,
    pub track_sweep_interval_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            frame_skip: 1,
            require_stable_track: false,
            track_sweep_interval_ms: 500,
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("pipeline.frame_skip", self.frame_skip as f64)?;
        positive(
            "pipeline.track_sweep_interval_ms",
            self.track_sweep_interval_ms as f64,
        )
    }
}

fn unit_interval(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value })
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value })
    }
}

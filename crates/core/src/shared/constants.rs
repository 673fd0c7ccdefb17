pub const DETECTOR_MODEL_NAME: &str = "scrfd_500m_kps.onnx";
pub const LIVENESS_MODEL_NAME: &str = "minifasnet_v2.onnx";

// Detector
pub const DEFAULT_INPUT_SIZE: u32 = 640;
pub const DEFAULT_STRIDES: [u32; 3] = [8, 16, 32];
pub const DEFAULT_ANCHORS_PER_POSITION: usize = 2;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;
pub const DEFAULT_IOU_THRESHOLD: f64 = 0.4;
pub const DEFAULT_TOP_K: usize = 5000;
pub const DEFAULT_ANCHOR_CACHE_CAPACITY: usize = 100;

// Liveness
pub const DEFAULT_LIVENESS_INPUT_SIZE: u32 = 80;
pub const DEFAULT_CROP_EXPANSION: f64 = 1.5;

// Tracker
pub const DEFAULT_MAX_TRACKING_DISTANCE: f64 = 100.0;
pub const DEFAULT_TRACK_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_SMOOTHING_ALPHA: f64 = 0.7;
pub const DEFAULT_MIN_DETECTIONS_FOR_STABILITY: u32 = 5;
pub const DEFAULT_STABILITY_THRESHOLD: f64 = 0.8;

// Attendance
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_REFERENCE_FACE_AREA: f64 = 10_000.0;
pub const DEFAULT_MAX_SESSION_HISTORY: usize = 100;

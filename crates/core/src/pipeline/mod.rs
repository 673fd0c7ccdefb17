pub mod attendance_pipeline;
pub mod face_recognizer;
pub mod infrastructure;
pub mod pipeline_logger;

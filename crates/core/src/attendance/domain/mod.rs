pub mod attendance_event;
pub mod deduplication_engine;
pub mod detection_session;

pub mod anchor_cache;
pub mod anchor_decoder;
pub mod candidate;
pub mod face_detector;
pub mod raw_output;
pub mod suppressor;

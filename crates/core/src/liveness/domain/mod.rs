pub mod face_crop;
pub mod geometry_gate;
pub mod liveness_gate;
pub mod liveness_model;
pub mod liveness_result;
pub mod temporal_analyzer;

pub mod face_tracker;
pub mod tracked_face;

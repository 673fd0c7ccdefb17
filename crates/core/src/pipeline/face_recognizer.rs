use serde::{Deserialize, Serialize};

use crate::detection::domain::candidate::Detection;
use crate::shared::frame::Frame;

/// Identity match for one face.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub person_id: String,
    pub similarity: f64,
}

/// External face recognizer. `Ok(None)` means the face is unknown.
pub trait FaceRecognizer: Send {
    fn recognize(
        &mut self,
        frame: &Frame,
        detection: &Detection,
    ) -> Result<Option<Recognition>, Box<dyn std::error::Error>>;
}

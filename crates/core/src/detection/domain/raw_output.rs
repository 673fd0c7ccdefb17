/// Raw detector output for one feature-map stride.
///
/// Layout per position `i = (row * grid_w + col) * anchors_per_position + a`:
/// - `scores[i]`: face probability
/// - `boxes[i*4..i*4+4]`: left, top, right, bottom distances in stride units
/// - `landmarks[i*10..i*10+10]`: five `(dx, dy)` pairs in stride units
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StrideOutput {
    pub stride: u32,
    pub scores: Vec<f32>,
    pub boxes: Vec<f32>,
    pub landmarks: Option<Vec<f32>>,
}

impl StrideOutput {
    pub fn new(stride: u32, scores: Vec<f32>, boxes: Vec<f32>, landmarks: Option<Vec<f32>>) -> Self {
        Self {
            stride,
            scores,
            boxes,
            landmarks,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// All strides of one inference call, plus the resize factor that produced
/// the network input (`resized / original`).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawOutputSet {
    pub strides: Vec<StrideOutput>,
    pub det_scale: f64,
}

impl RawOutputSet {
    pub fn new(strides: Vec<StrideOutput>, det_scale: f64) -> Self {
        Self { strides, det_scale }
    }
}

use serde::{Deserialize, Serialize};

/// Live/spoof verdict for a single face crop.
///
/// Decision rule: softmax over `[live_logit, spoof_logit]`, live when the
/// live probability is at least the spoof probability. `raw_score` is the
/// logit margin and is kept for diagnostics only.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LivenessResult {
    pub is_live: bool,
    pub confidence: f64,
    pub raw_score: f64,
    pub live_probability: f64,
    pub spoof_probability: f64,
}

impl LivenessResult {
    pub fn from_logits(live_logit: f64, spoof_logit: f64) -> Self {
        let max = live_logit.max(spoof_logit);
        let live_exp = (live_logit - max).exp();
        let spoof_exp = (spoof_logit - max).exp();
        let sum = live_exp + spoof_exp;
        let live_probability = live_exp / sum;
        let spoof_probability = spoof_exp / sum;

        Self {
            is_live: live_probability >= spoof_probability,
            confidence: live_probability.max(spoof_probability),
            raw_score: live_logit - spoof_logit,
            live_probability,
            spoof_probability,
        }
    }
}

/// Per-face liveness outcome as reported by the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessStatus {
    /// Liveness checking is turned off.
    Unchecked,
    Live,
    Spoof,
    /// Face below the configured minimum size; never counted as live.
    TooSmall,
    /// The gate failed (model not ready, bad crop, inference error).
    /// Treated as spoof.
    Error,
}

impl LivenessStatus {
    /// Whether the face may contribute to attendance.
    pub fn admits(&self) -> bool {
        matches!(self, LivenessStatus::Live | LivenessStatus::Unchecked)
    }
}

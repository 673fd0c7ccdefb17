use crate::shared::bbox::BoundingBox;
use crate::shared::config::LivenessConfig;
use crate::shared::frame::Frame;

use super::face_crop::prepare_crop;
use super::liveness_model::{LivenessError, LivenessModel};
use super::liveness_result::LivenessResult;

/// Runs the anti-spoofing model on an expanded face crop and applies the
/// softmax decision.
pub struct LivenessGate {
    model: Box<dyn LivenessModel>,
    config: LivenessConfig,
}

impl LivenessGate {
    pub fn new(model: Box<dyn LivenessModel>, config: LivenessConfig) -> Self {
        Self { model, config }
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_ready()
    }

    pub fn check(&mut self, frame: &Frame, bbox: &BoundingBox) -> Result<LivenessResult, LivenessError> {
        if !self.model.is_ready() {
            return Err(LivenessError::NotReady);
        }

        let input = prepare_crop(frame, bbox, &self.config)?;
        let [live, spoof] = self.model.infer(input)?;
        if !live.is_finite() || !spoof.is_finite() {
            return Err(LivenessError::Inference(format!(
                "non-finite logits [{live}, {spoof}]"
            )));
        }

        Ok(LivenessResult::from_logits(live as f64, spoof as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct FixedModel {
        ready: bool,
        logits: [f32; 2],
        calls: usize,
    }

    impl LivenessModel for FixedModel {
        fn is_ready(&self) -> bool {
            self.ready
        }

        fn infer(&mut self, input: ndarray::Array4<f32>) -> Result<[f32; 2], LivenessError> {
            assert_eq!(input.shape(), &[1, 3, 80, 80]);
            self.calls += 1;
            Ok(self.logits)
        }
    }

    fn gate(ready: bool, logits: [f32; 2]) -> LivenessGate {
        LivenessGate::new(
            Box::new(FixedModel {
                ready,
                logits,
                calls: 0,
            }),
            LivenessConfig::default(),
        )
    }

    fn frame() -> Frame {
        Frame::new(vec![90u8; 320 * 240 * 3], 320, 240, 3, 0)
    }

    #[test]
    fn test_spoof_logits_yield_spoof() {
        let mut gate = gate(true, [0.3f32.ln(), 0.7f32.ln()]);
        let bbox = BoundingBox::new(100.0, 80.0, 160.0, 150.0);

        let result = gate.check(&frame(), &bbox).unwrap();

        assert!(!result.is_live);
        assert_relative_eq!(result.confidence, 0.7, epsilon = 1e-6);
    }

    #[test]
    fn test_live_logits_yield_live() {
        let mut gate = gate(true, [3.0, -2.0]);
        let bbox = BoundingBox::new(100.0, 80.0, 160.0, 150.0);
        assert!(gate.check(&frame(), &bbox).unwrap().is_live);
    }

    #[test]
    fn test_not_ready_model_fails() {
        let mut gate = gate(false, [3.0, -2.0]);
        let bbox = BoundingBox::new(100.0, 80.0, 160.0, 150.0);
        assert_eq!(gate.check(&frame(), &bbox), Err(LivenessError::NotReady));
    }

    #[test]
    fn test_zero_area_box_fails_without_inference() {
        let mut gate = gate(true, [3.0, -2.0]);
        let bbox = BoundingBox::new(100.0, 80.0, 100.0, 150.0);
        assert!(matches!(
            gate.check(&frame(), &bbox),
            Err(LivenessError::InvalidCrop(_))
        ));
    }

    #[test]
    fn test_non_finite_logits_are_an_error() {
        let mut gate = gate(true, [f32::NAN, 0.0]);
        let bbox = BoundingBox::new(100.0, 80.0, 160.0, 150.0);
        assert!(matches!(
            gate.check(&frame(), &bbox),
            Err(LivenessError::Inference(_))
        ));
    }
}

use serde::{Deserialize, Serialize};

/// Axis-aligned face box in pixel coordinates, corners `(x1, y1)`-`(x2, y2)`.
///
/// Degenerate boxes (x2 <= x1 or y2 <= y1) are representable and have zero
/// area; every geometric query treats them as empty.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn center_distance(&self, other: &BoundingBox) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    /// Intersection-over-union. Non-overlapping or degenerate pairs yield 0.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }

    /// Divide every coordinate by `factor` (inverse of a resize scale).
    pub fn unscale(&self, factor: f64) -> BoundingBox {
        BoundingBox::new(
            self.x1 / factor,
            self.y1 / factor,
            self.x2 / factor,
            self.y2 / factor,
        )
    }

    /// Clip to `[0, width] x [0, height]`.
    pub fn clamp(&self, width: f64, height: f64) -> BoundingBox {
        BoundingBox::new(
            self.x1.clamp(0.0, width),
            self.y1.clamp(0.0, height),
            self.x2.clamp(0.0, width),
            self.y2.clamp(0.0, height),
        )
    }

    /// Exponential blend toward `target`: `self * (1 - alpha) + target * alpha`.
    pub fn blend(&self, target: &BoundingBox, alpha: f64) -> BoundingBox {
        let mix = |a: f64, b: f64| a * (1.0 - alpha) + b * alpha;
        BoundingBox::new(
            mix(self.x1, target.x1),
            mix(self.y1, target.y1),
            mix(self.x2, target.x2),
            mix(self.y2, target.y2),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn bbox(x: f64, y: f64, w: f64, h: f64) -> BoundingBox {
        BoundingBox::from_xywh(x, y, w, h)
    }

    // ── IoU ──────────────────────────────────────────────────────────

    #[test]
    fn test_iou_identical() {
        let a = bbox(10.0, 10.0, 100.0, 100.0);
        assert_relative_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = bbox(0.0, 0.0, 50.0, 50.0);
        let b = bbox(100.0, 100.0, 50.0, 50.0);
        assert_relative_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        // intersection 50*100 = 5000, union 15000
        let a = bbox(0.0, 0.0, 100.0, 100.0);
        let b = bbox(50.0, 0.0, 100.0, 100.0);
        assert_relative_eq!(a.iou(&b), 5000.0 / 15000.0);
    }

    #[test]
    fn test_iou_contained() {
        let a = bbox(0.0, 0.0, 100.0, 100.0);
        let b = bbox(25.0, 25.0, 50.0, 50.0);
        assert_relative_eq!(a.iou(&b), 0.25);
    }

    #[rstest]
    #[case::touching_edges(bbox(0.0, 0.0, 50.0, 50.0), bbox(50.0, 0.0, 50.0, 50.0))]
    #[case::zero_width(bbox(0.0, 0.0, 0.0, 100.0), bbox(0.0, 0.0, 50.0, 50.0))]
    #[case::zero_height(bbox(0.0, 0.0, 100.0, 0.0), bbox(0.0, 0.0, 50.0, 50.0))]
    fn test_iou_degenerate(#[case] a: BoundingBox, #[case] b: BoundingBox) {
        assert_relative_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_is_symmetric() {
        let a = bbox(0.0, 0.0, 80.0, 60.0);
        let b = bbox(30.0, 20.0, 90.0, 70.0);
        assert_relative_eq!(a.iou(&b), b.iou(&a));
    }

    // ── Geometry ─────────────────────────────────────────────────────

    #[test]
    fn test_inverted_box_has_zero_area() {
        let b = BoundingBox::new(10.0, 10.0, 5.0, 5.0);
        assert_relative_eq!(b.area(), 0.0);
    }

    #[test]
    fn test_center_and_distance() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        let b = bbox(30.0, 40.0, 10.0, 10.0);
        assert_eq!(a.center(), (5.0, 5.0));
        assert_relative_eq!(a.center_distance(&b), 50.0);
    }

    #[test]
    fn test_unscale_divides_coordinates() {
        let b = BoundingBox::new(10.0, 20.0, 30.0, 40.0).unscale(0.5);
        assert_eq!(b, BoundingBox::new(20.0, 40.0, 60.0, 80.0));
    }

    #[test]
    fn test_clamp_to_frame() {
        let b = BoundingBox::new(-10.0, -5.0, 700.0, 300.0).clamp(640.0, 480.0);
        assert_eq!(b, BoundingBox::new(0.0, 0.0, 640.0, 300.0));
    }

    // ── Blend ────────────────────────────────────────────────────────

    #[test]
    fn test_blend_is_convex() {
        let prev = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        let next = BoundingBox::new(10.0, 20.0, 110.0, 120.0);
        let b = prev.blend(&next, 0.7);
        assert_relative_eq!(b.x1, 7.0);
        assert_relative_eq!(b.y1, 14.0);
        assert_relative_eq!(b.x2, 107.0);
        assert_relative_eq!(b.y2, 114.0);
    }

    #[rstest]
    #[case(0.0)]
    #[case(1.0)]
    fn test_blend_endpoints(#[case] alpha: f64) {
        let prev = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        let next = BoundingBox::new(50.0, 50.0, 150.0, 150.0);
        let expected = if alpha == 0.0 { prev } else { next };
        assert_eq!(prev.blend(&next, alpha), expected);
    }
}

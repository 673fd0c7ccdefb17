use crate::shared::frame::Frame;

const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 128.0;

/// Aspect-preserving resize into the top-left of a `size x size` canvas,
/// normalized to `(pixel - 127.5) / 128` in RGB NCHW float32.
///
/// Returns the tensor and the detection scale (`resized / original`).
pub fn letterbox(frame: &Frame, size: u32) -> (ndarray::Array4<f32>, f64) {
    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let s = size as usize;

    let im_ratio = src_h as f64 / src_w as f64;
    let (new_w, new_h) = if im_ratio > 1.0 {
        (((s as f64) / im_ratio) as usize, s)
    } else {
        (s, ((s as f64) * im_ratio) as usize)
    };
    let new_w = new_w.max(1);
    let new_h = new_h.max(1);
    let det_scale = new_h as f64 / src_h as f64;

    // Padding stays at the normalized value of a black pixel
    let pad = (0.0 - PIXEL_MEAN) / PIXEL_STD;
    let mut tensor = ndarray::Array4::<f32>::from_elem((1, 3, s, s), pad);

    for y in 0..new_h {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / new_h as f64) as usize).min(src_h - 1);
        for x in 0..new_w {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / new_w as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = (src[[src_y, src_x, c]] as f32 - PIXEL_MEAN) / PIXEL_STD;
            }
        }
    }

    (tensor, det_scale)
}

use ndarray::Array4;

use crate::shared::bbox::BoundingBox;
use crate::shared::config::{ChannelOrder, LivenessConfig};
use crate::shared::frame::Frame;

use super::liveness_model::LivenessError;

/// Square crop window around a face, in integer pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub side: u32,
}

/// Expand `bbox` to a square of `max(w, h) * expansion`, centered on the
/// box, then shift it inside the image. If the square is still larger than
/// the image it is shrunk to the shorter image side.
pub fn crop_window(
    bbox: &BoundingBox,
    expansion: f64,
    image_width: u32,
    image_height: u32,
) -> Result<CropWindow, LivenessError> {
    let w = bbox.width();
    let h = bbox.height();
    if w <= 0.0 || h <= 0.0 {
        return Err(LivenessError::InvalidCrop(format!(
            "zero-area box {w:.1}x{h:.1}"
        )));
    }
    if image_width == 0 || image_height == 0 {
        return Err(LivenessError::InvalidCrop("empty image".into()));
    }
    let img_w = image_width as f64;
    let img_h = image_height as f64;
    if bbox.x2 <= 0.0 || bbox.y2 <= 0.0 || bbox.x1 >= img_w || bbox.y1 >= img_h {
        return Err(LivenessError::InvalidCrop(
            "box lies outside the image".into(),
        ));
    }

    let side = (w.max(h) * expansion).min(img_w.min(img_h)).max(1.0);
    let (cx, cy) = bbox.center();

    let x = (cx - side / 2.0).clamp(0.0, img_w - side);
    let y = (cy - side / 2.0).clamp(0.0, img_h - side);

    Ok(CropWindow {
        x: x.round() as u32,
        y: y.round() as u32,
        side: (side.round() as u32).max(1),
    })
}

/// Crop, nearest-neighbour resize and normalize a face into a
/// `[1, 3, S, S]` tensor.
pub fn prepare_crop(
    frame: &Frame,
    bbox: &BoundingBox,
    config: &LivenessConfig,
) -> Result<Array4<f32>, LivenessError> {
    if frame.is_empty() || frame.channels() < 3 {
        return Err(LivenessError::InvalidCrop(format!(
            "unsupported frame {}x{}x{}",
            frame.width(),
            frame.height(),
            frame.channels()
        )));
    }

    let window = crop_window(bbox, config.expansion_factor, frame.width(), frame.height())?;
    let src = frame.as_ndarray();
    let max_x = frame.width() as usize - 1;
    let max_y = frame.height() as usize - 1;
    let s = config.input_size as usize;
    let step = window.side as f64 / s as f64;

    let order = match config.channel_order {
        ChannelOrder::Rgb => [0, 1, 2],
        ChannelOrder::Bgr => [2, 1, 0],
    };

    let mut tensor = Array4::<f32>::zeros((1, 3, s, s));
    for y in 0..s {
        let src_y = (window.y as usize + ((y as f64 + 0.5) * step) as usize).min(max_y);
        for x in 0..s {
            let src_x = (window.x as usize + ((x as f64 + 0.5) * step) as usize).min(max_x);
            for (c, &src_c) in order.iter().enumerate() {
                let px = src[[src_y, src_x, src_c]] as f32;
                tensor[[0, c, y, x]] = (px * config.scale - config.mean[c]) / config.std[c];
            }
        }
    }

    Ok(tensor)
}

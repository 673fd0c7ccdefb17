use std::path::Path;

use crate::shared::frame::Frame;

/// Decode an image file into an RGB [`Frame`].
pub fn read_frame(path: &Path, index: usize) -> Result<Frame, Box<dyn std::error::Error>> {
    let img = image::open(path)
        .map_err(|e| format!("failed to open {}: {e}", path.display()))?
        .to_rgb8();
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(format!("{} has no pixels", path.display()).into());
    }
    Ok(Frame::new(img.into_raw(), width, height, 3, index))
}

/// Whether `path` has an extension the reader understands.
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

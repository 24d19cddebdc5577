use ndarray::Array4;
use tracing::debug;

use crate::engine::EngineError;
use crate::image_impl::{resize, Mat, Size};
use crate::types::ScaleFactor;

/// Stretch to exactly `target_w x target_h`, RGB planes scaled to [0, 1].
pub fn prepare_layout_input(
    img: &Mat,
    target_w: u32,
    target_h: u32,
) -> Result<(Array4<f32>, ScaleFactor), EngineError> {
    check_not_empty(img)?;
    if target_w == 0 || target_h == 0 {
        return Err(EngineError::Preprocess("layout target size must be non-zero".to_string()));
    }

    let resized = resize(img, Size::new(target_w as i32, target_h as i32));
    let scale = ScaleFactor::between(img.cols() as u32, img.rows() as u32, target_w, target_h);

    let tensor = to_planes(&resized, false, |v, _| v / 255.0);
    Ok((tensor, scale))
}

/// Aspect-preserving resize so the longer side is at most `max_side`, each
/// side then rounded up to a multiple of `block_size`. RGB planes are
/// normalized with the per-channel `mean` and `std`.
pub fn prepare_detection_input(
    img: &Mat,
    max_side: u32,
    block_size: u32,
    mean: [f32; 3],
    std: [f32; 3],
) -> Result<(Array4<f32>, ScaleFactor), EngineError> {
    check_not_empty(img)?;

    let h = img.rows();
    let w = img.cols();
    let max_wh = h.max(w) as f32;
    let ratio = if max_wh > max_side as f32 {
        max_side as f32 / max_wh
    } else {
        1.0
    };

    let block = block_size.max(1) as i32;
    let resize_h = round_up((h as f32 * ratio) as i32, block);
    let resize_w = round_up((w as f32 * ratio) as i32, block);
    if resize_h <= 0 || resize_w <= 0 {
        return Err(EngineError::Preprocess("resize_h or resize_w <= 0".to_string()));
    }
    debug!("Detection resize {}x{} -> {}x{}", w, h, resize_w, resize_h);

    let resized = resize(img, Size::new(resize_w, resize_h));
    let scale = ScaleFactor::between(w as u32, h as u32, resize_w as u32, resize_h as u32);

    let tensor = to_planes(&resized, false, |v, c| (v / 255.0 - mean[c]) / std[c]);
    Ok((tensor, scale))
}

/// Resize to `fixed_height`, width following the aspect ratio and capped at
/// `max_width`. BGR planes mapped to [-1, 1].
pub fn prepare_recognition_input(
    img: &Mat,
    fixed_height: u32,
    max_width: u32,
) -> Result<Array4<f32>, EngineError> {
    check_not_empty(img)?;
    if fixed_height == 0 {
        return Err(EngineError::Preprocess("recognition height must be non-zero".to_string()));
    }

    let scale = fixed_height as f32 / img.rows() as f32;
    let width = ((img.cols() as f32 * scale) as i32).max(1).min(max_width.max(1) as i32);

    let resized = resize(img, Size::new(width, fixed_height as i32));
    Ok(to_planes(&resized, true, |v, _| (v / 255.0 - 0.5) / 0.5))
}

fn check_not_empty(img: &Mat) -> Result<(), EngineError> {
    if img.empty() {
        return Err(EngineError::Preprocess("image has zero area".to_string()));
    }
    Ok(())
}

fn round_up(value: i32, block: i32) -> i32 {
    (value + block - 1) / block * block
}

/// HWC u8 -> NCHW f32. `bgr` swaps the plane order; `norm` receives the raw
/// value and the index of its source RGB channel.
fn to_planes<F>(img: &Mat, bgr: bool, norm: F) -> Array4<f32>
where
    F: Fn(f32, usize) -> f32,
{
    let h = img.rows() as usize;
    let w = img.cols() as usize;
    let mut out = Array4::<f32>::zeros((1, 3, h, w));

    for (x, y, pixel) in img.as_rgb().enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            let plane = if bgr { 2 - c } else { c };
            out[[0, plane, y, x]] = norm(pixel[c] as f32, c);
        }
    }

    out
}

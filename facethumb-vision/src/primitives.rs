//! Small numeric and image helpers shared by the detector and the selector.

use image::{imageops::FilterType, RgbImage};

/// Logistic activation.
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Softmax over a fixed-size vector.
///
/// The maximum is subtracted before exponentiation so large logits do not
/// overflow; the result is unchanged by adding a constant to every input.
pub fn softmax<const N: usize>(xs: &[f32; N]) -> [f32; N] {
    let max = xs.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut ys = [0.0f32; N];
    let mut sum = 0.0f32;
    for (y, &x) in ys.iter_mut().zip(xs.iter()) {
        *y = (x - max).exp();
        sum += *y;
    }
    if sum > 0.0 {
        for y in ys.iter_mut() {
            *y /= sum;
        }
    }
    ys
}

/// Ratio that fits a `width` x `height` image inside `max_width` x `max_height`.
pub fn fit_ratio(width: u32, height: u32, max_width: u32, max_height: u32) -> f32 {
    (max_width as f32 / width as f32).min(max_height as f32 / height as f32)
}

/// Resize preserving aspect ratio so the image fits inside `max_width` x `max_height`.
///
/// Both dimensions are scaled by the same ratio and rounded; one of them lands
/// exactly on its bound. Zero-sized inputs are returned unchanged.
pub fn image_scale(img: &RgbImage, max_width: u32, max_height: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return img.clone();
    }

    let ratio = fit_ratio(width, height, max_width, max_height);
    let new_width = ((width as f32 * ratio).round() as u32).max(1);
    let new_height = ((height as f32 * ratio).round() as u32).max(1);
    if (new_width, new_height) == (width, height) {
        return img.clone();
    }

    image::imageops::resize(img, new_width, new_height, FilterType::Triangle)
}

/// Offsets `(left, top)` at which an image lands when padded to a square.
pub fn pad_offsets(width: u32, height: u32) -> (u32, u32) {
    if width < height {
        ((height - width) / 2, 0)
    } else {
        (0, (width - height) / 2)
    }
}

/// Pad to a square of the larger dimension, centred, zero-filled.
///
/// Odd differences put the extra row/column on the bottom/right. An already
/// square image is returned as is.
pub fn image_pad_square(img: RgbImage) -> RgbImage {
    let (width, height) = img.dimensions();
    if width == height {
        return img;
    }

    let side = width.max(height);
    let (left, top) = pad_offsets(width, height);
    let mut canvas = RgbImage::new(side, side);
    image::imageops::overlay(&mut canvas, &img, left as i64, top as i64);
    canvas
}

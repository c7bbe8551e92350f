//! Resampling helpers shared by the fingerprint and quality passes.
//!
//! Both go through `imageops::thumbnail`, which box-averages source pixels
//! when shrinking. Uniform images stay exactly uniform.

use std::borrow::Cow;

use image::imageops;
use image::{Rgb, RgbImage};

/// ITU-R BT.601 luma weights.
const LUMA_R: f64 = 0.299;
const LUMA_G: f64 = 0.587;
const LUMA_B: f64 = 0.114;

/// Luminance of a single RGB triple.
#[inline]
#[must_use]
pub fn luminance(r: f64, g: f64, b: f64) -> f64 {
    LUMA_R * r + LUMA_G * g + LUMA_B * b
}

/// Luminance of a pixel.
#[inline]
#[must_use]
pub fn pixel_luminance(pixel: &Rgb<u8>) -> f64 {
    luminance(
        f64::from(pixel[0]),
        f64::from(pixel[1]),
        f64::from(pixel[2]),
    )
}

/// Resample `image` to a `width x height` grid of luminance values.
///
/// Returned row-major. `image` must be non-empty.
#[must_use]
pub fn luminance_grid(image: &RgbImage, width: u32, height: u32) -> Vec<f64> {
    imageops::thumbnail(image, width, height)
        .pixels()
        .map(pixel_luminance)
        .collect()
}

/// Downsample so the longest side is at most `max_dimension`, never upsampling.
#[must_use]
pub fn downsample(image: &RgbImage, max_dimension: u32) -> Cow<'_, RgbImage> {
    let (w, h) = image.dimensions();
    let longest = w.max(h);
    if longest <= max_dimension || longest == 0 {
        return Cow::Borrowed(image);
    }

    let scale = f64::from(max_dimension) / f64::from(longest);
    let new_w = ((f64::from(w) * scale).round() as u32).clamp(1, max_dimension);
    let new_h = ((f64::from(h) * scale).round() as u32).clamp(1, max_dimension);

    Cow::Owned(imageops::thumbnail(image, new_w, new_h))
}

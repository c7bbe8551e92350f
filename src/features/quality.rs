//! Technical quality scoring: sharpness and exposure.
//!
//! # Blur
//!
//! Sharpness is measured with the variance of the discrete Laplacian response
//! `[0,1,0; 1,-4,1; 0,1,0]`. The interior is split into a 4x4 block grid and the
//! sharpest block dominates the score, so photographs with a deliberately
//! blurred background still rate as focused when the subject is sharp.
//!
//! # Exposure
//!
//! Exposure combines three histogram statistics: how far the mean luminance
//! sits from mid-gray, how wide the tonal spread is, and how many pixels are
//! crushed into the darkest or brightest bins.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use super::resample::pixel_luminance;

/// Number of blocks per side of the sharpness grid.
const BLOCK_GRID: usize = 4;

/// Minimum interior side length (pixels) needed to split into blocks.
const MIN_BLOCK_INTERIOR: usize = 2 * BLOCK_GRID;

/// Laplacian variance that maps to a full sharpness score.
const VARIANCE_SATURATION: f64 = 800.0;

/// Weight of the sharpest block versus the global variance.
const BLOCK_WEIGHT: f64 = 0.7;
const GLOBAL_WEIGHT: f64 = 0.3;

/// Number of histogram bins at each end counted as clipped.
const CLIP_BINS: usize = 10;

/// Technical quality of one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityResult {
    /// Sharpness score in `[0, 100]`.
    pub blur_score: u8,
    /// Exposure score in `[0, 100]`.
    pub exposure_score: u8,
    /// `round(0.7 * blur + 0.3 * exposure)`.
    pub quality_score: u8,
}

impl QualityResult {
    /// Combine blur and exposure scores into a quality result.
    #[must_use]
    pub fn new(blur_score: u8, exposure_score: u8) -> Self {
        let blur_score = blur_score.min(100);
        let exposure_score = exposure_score.min(100);
        let combined = 0.7 * f64::from(blur_score) + 0.3 * f64::from(exposure_score);
        Self {
            blur_score,
            exposure_score,
            quality_score: to_score(combined),
        }
    }

    /// Score the working (already downsampled) image.
    #[must_use]
    pub fn measure(working: &RgbImage) -> Self {
        let luma = LumaPlane::from_rgb(working);
        Self::new(blur_score(&luma), exposure_score(&luma))
    }
}

/// Row-major luminance values of the working image.
pub(crate) struct LumaPlane {
    width: usize,
    height: usize,
    values: Vec<f64>,
}

impl LumaPlane {
    pub(crate) fn from_rgb(image: &RgbImage) -> Self {
        let (w, h) = image.dimensions();
        Self {
            width: w as usize,
            height: h as usize,
            values: image.pixels().map(pixel_luminance).collect(),
        }
    }

    #[inline]
    fn at(&self, x: usize, y: usize) -> f64 {
        self.values[y * self.width + x]
    }
}

/// Round and clamp a floating score into `[0, 100]`.
fn to_score(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// Map a Laplacian variance into `[0, 100]`.
fn map_variance(variance: f64) -> f64 {
    100.0 * (variance / VARIANCE_SATURATION).min(1.0)
}

/// Population variance accumulator.
#[derive(Default, Clone, Copy)]
struct Moments {
    count: usize,
    sum: f64,
    sum_sq: f64,
}

impl Moments {
    fn push(&mut self, v: f64) {
        self.count += 1;
        self.sum += v;
        self.sum_sq += v * v;
    }

    fn variance(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        let mean = self.sum / n;
        (self.sum_sq / n - mean * mean).max(0.0)
    }
}

/// Sharpness score from the Laplacian response of the interior pixels.
pub(crate) fn blur_score(luma: &LumaPlane) -> u8 {
    if luma.width < 3 || luma.height < 3 {
        return 0;
    }

    let inner_w = luma.width - 2;
    let inner_h = luma.height - 2;
    let subdivide = inner_w >= MIN_BLOCK_INTERIOR && inner_h >= MIN_BLOCK_INTERIOR;

    let mut global = Moments::default();
    let mut blocks = [Moments::default(); BLOCK_GRID * BLOCK_GRID];

    for iy in 0..inner_h {
        let y = iy + 1;
        let by = iy * BLOCK_GRID / inner_h;
        for ix in 0..inner_w {
            let x = ix + 1;
            let response = luma.at(x, y - 1) + luma.at(x, y + 1) + luma.at(x - 1, y)
                + luma.at(x + 1, y)
                - 4.0 * luma.at(x, y);
            global.push(response);
            if subdivide {
                let bx = ix * BLOCK_GRID / inner_w;
                blocks[by * BLOCK_GRID + bx].push(response);
            }
        }
    }

    let global_variance = global.variance();
    if !subdivide {
        return to_score(map_variance(global_variance));
    }

    let max_block = blocks
        .iter()
        .map(Moments::variance)
        .fold(0.0_f64, f64::max);

    to_score(BLOCK_WEIGHT * map_variance(max_block) + GLOBAL_WEIGHT * map_variance(global_variance))
}

/// Exposure score from the luminance histogram.
pub(crate) fn exposure_score(luma: &LumaPlane) -> u8 {
    if luma.values.is_empty() {
        return 0;
    }

    let mut histogram = [0u64; 256];
    for v in &luma.values {
        histogram[v.round().clamp(0.0, 255.0) as usize] += 1;
    }

    let total = luma.values.len() as f64;
    let mean = histogram
        .iter()
        .enumerate()
        .map(|(bin, &n)| bin as f64 * n as f64)
        .sum::<f64>()
        / total;
    let variance = histogram
        .iter()
        .enumerate()
        .map(|(bin, &n)| {
            let d = bin as f64 - mean;
            d * d * n as f64
        })
        .sum::<f64>()
        / total;
    let std_dev = variance.sqrt();

    let dark = histogram[..CLIP_BINS].iter().sum::<u64>() as f64 / total;
    let bright = histogram[256 - CLIP_BINS..].iter().sum::<u64>() as f64 / total;

    let mean_penalty = 1.0 - (mean - 128.0).abs() / 128.0;
    let spread_score = (std_dev / 60.0).min(1.0);
    let clip_penalty = (1.0 - (3.0 * (dark + bright)).min(1.0)).max(0.0);

    to_score(100.0 * (0.5 * mean_penalty + 0.3 * spread_score + 0.2 * clip_penalty))
}

//! Image type classification: photograph, screenshot, or scanned document.
//!
//! Rules are evaluated in a fixed order and the first match wins:
//!
//! 1. **Document** - mostly near-white pixels with a small quantized palette,
//!    with a looser variant for pages in A4 or Letter proportions.
//! 2. **Screenshot** - a common screen aspect ratio together with a uniform
//!    status/navigation band at the top or bottom, or an exact match against a
//!    table of common screen resolutions.
//! 3. **Photo** - everything else.
//!
//! All numeric cut-offs live in [`ClassifierThresholds`]; they are empirically
//! tuned and exposed as configuration.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use super::resample::pixel_luminance;

/// Classified image type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TypeLabel {
    /// Camera photograph (default).
    #[default]
    Photo,
    /// Screen capture from a desktop or mobile device.
    Screenshot,
    /// Scanned or photographed paper document.
    Document,
}

impl std::fmt::Display for TypeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Photo => write!(f, "photo"),
            Self::Screenshot => write!(f, "screenshot"),
            Self::Document => write!(f, "document"),
        }
    }
}

/// Screen aspect ratios (width / height), landscape and portrait.
const SCREEN_RATIOS: &[f64] = &[
    16.0 / 9.0,
    9.0 / 16.0,
    16.0 / 10.0,
    10.0 / 16.0,
    4.0 / 3.0,
    3.0 / 4.0,
    3.0 / 2.0,
    2.0 / 3.0,
    19.5 / 9.0,
    9.0 / 19.5,
    20.0 / 9.0,
    9.0 / 20.0,
    19.0 / 9.0,
    9.0 / 19.0,
];

/// Exact screen and device resolutions (width, height).
const SCREEN_RESOLUTIONS: &[(u32, u32)] = &[
    // Desktop and laptop panels
    (1280, 720),
    (1280, 800),
    (1366, 768),
    (1440, 900),
    (1536, 864),
    (1600, 900),
    (1680, 1050),
    (1920, 1080),
    (1920, 1200),
    (2560, 1080),
    (2560, 1440),
    (2560, 1600),
    (2880, 1800),
    (3024, 1964),
    (3440, 1440),
    (3456, 2234),
    (3840, 2160),
    (5120, 2880),
    // Phones (portrait)
    (640, 1136),
    (750, 1334),
    (828, 1792),
    (1080, 1920),
    (1080, 2340),
    (1080, 2400),
    (1125, 2436),
    (1170, 2532),
    (1179, 2556),
    (1242, 2208),
    (1242, 2688),
    (1284, 2778),
    (1290, 2796),
    (1440, 3088),
    (1440, 3200),
    // Tablets (portrait)
    (1536, 2048),
    (1620, 2160),
    (1640, 2360),
    (1668, 2388),
    (2048, 2732),
];

/// A4 page proportions (long side / short side).
const A4_RATIO: f64 = 1.414;

/// US Letter page proportions (long side / short side).
const LETTER_RATIO: f64 = 1.294;

/// Tunable classification constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierThresholds {
    /// Luminance above which a pixel counts as near-white.
    pub white_luminance: f64,
    /// White fraction required for a document without page proportions.
    pub document_white_fraction: f64,
    /// Distinct color ceiling for a document without page proportions.
    pub document_max_colors: usize,
    /// Tolerance around the A4 and Letter ratios.
    pub page_ratio_tolerance: f64,
    /// White fraction required for a page-proportioned document.
    pub page_white_fraction: f64,
    /// Distinct color ceiling for a page-proportioned document.
    pub page_max_colors: usize,
    /// Tolerance around the screen aspect ratios.
    pub screen_ratio_tolerance: f64,
    /// Status bar band height as a fraction of image height.
    pub band_height_fraction: f64,
    /// Minimum band height in pixels.
    pub band_min_height: u32,
    /// Maximum band height in pixels.
    pub band_max_height: u32,
    /// Combined RGB delta above which a band pixel deviates.
    pub band_color_delta: u32,
    /// Fraction of sampled band pixels allowed to deviate.
    pub band_max_deviation: f64,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            white_luminance: 220.0,
            document_white_fraction: 0.55,
            document_max_colors: 150,
            page_ratio_tolerance: 0.15,
            page_white_fraction: 0.45,
            page_max_colors: 250,
            screen_ratio_tolerance: 0.05,
            band_height_fraction: 0.06,
            band_min_height: 2,
            band_max_height: 8,
            band_color_delta: 30,
            band_max_deviation: 0.15,
        }
    }
}

/// Palette statistics of the working image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaletteStats {
    /// Fraction of pixels with luminance above the white threshold.
    pub white_fraction: f64,
    /// Number of distinct 4-bit-per-channel colors.
    pub distinct_colors: usize,
}

impl PaletteStats {
    /// Measure the working image.
    #[must_use]
    pub fn measure(working: &RgbImage, white_luminance: f64) -> Self {
        let mut seen = [false; 4096];
        let mut distinct = 0usize;
        let mut white = 0usize;

        for p in working.pixels() {
            if pixel_luminance(p) > white_luminance {
                white += 1;
            }
            let bucket = (usize::from(p[0] >> 4) << 8)
                | (usize::from(p[1] >> 4) << 4)
                | usize::from(p[2] >> 4);
            if !seen[bucket] {
                seen[bucket] = true;
                distinct += 1;
            }
        }

        let total = working.width() as usize * working.height() as usize;
        Self {
            white_fraction: if total == 0 {
                0.0
            } else {
                white as f64 / total as f64
            },
            distinct_colors: distinct,
        }
    }
}

/// Classifies images using [`ClassifierThresholds`].
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    thresholds: ClassifierThresholds,
}

impl Classifier {
    /// Create a classifier with the given thresholds.
    #[must_use]
    pub fn new(thresholds: ClassifierThresholds) -> Self {
        Self { thresholds }
    }

    /// The thresholds in use.
    #[must_use]
    pub fn thresholds(&self) -> &ClassifierThresholds {
        &self.thresholds
    }

    /// Classify an image.
    ///
    /// `original` is the decoded image at full resolution (used for aspect
    /// ratio, resolution, and band checks); `working` is its downsampled copy
    /// (used for palette statistics).
    #[must_use]
    pub fn classify(&self, original: &RgbImage, working: &RgbImage) -> TypeLabel {
        if self.is_document(original, working) {
            TypeLabel::Document
        } else if self.is_screenshot(original) {
            TypeLabel::Screenshot
        } else {
            TypeLabel::Photo
        }
    }

    fn is_document(&self, original: &RgbImage, working: &RgbImage) -> bool {
        let t = &self.thresholds;
        let stats = PaletteStats::measure(working, t.white_luminance);

        if stats.white_fraction > t.document_white_fraction
            && stats.distinct_colors < t.document_max_colors
        {
            return true;
        }

        let (w, h) = original.dimensions();
        let long = f64::from(w.max(h));
        let short = f64::from(w.min(h).max(1));
        let ratio = long / short;
        let page_shaped = (ratio - A4_RATIO).abs() <= t.page_ratio_tolerance
            || (ratio - LETTER_RATIO).abs() <= t.page_ratio_tolerance;

        page_shaped
            && stats.white_fraction > t.page_white_fraction
            && stats.distinct_colors < t.page_max_colors
    }

    fn is_screenshot(&self, original: &RgbImage) -> bool {
        let (w, h) = original.dimensions();
        if SCREEN_RESOLUTIONS.contains(&(w, h)) {
            return true;
        }
        if h == 0 {
            return false;
        }

        let ratio = f64::from(w) / f64::from(h);
        let screen_shaped = SCREEN_RATIOS
            .iter()
            .any(|r| (ratio - r).abs() <= self.thresholds.screen_ratio_tolerance);
        if !screen_shaped {
            return false;
        }

        let band = self.band_height(h);
        self.band_is_uniform(original, 0, band) || self.band_is_uniform(original, h - band, band)
    }

    fn band_height(&self, height: u32) -> u32 {
        let t = &self.thresholds;
        let band = (f64::from(height) * t.band_height_fraction).round() as u32;
        band.clamp(t.band_min_height, t.band_max_height).min(height)
    }

    /// Whether rows `[top, top + rows)` are close to the band's first pixel.
    fn band_is_uniform(&self, image: &RgbImage, top: u32, rows: u32) -> bool {
        let t = &self.thresholds;
        let width = image.width();
        if width == 0 || rows == 0 {
            return false;
        }
        let step = (width / 64).max(1);
        let reference = *image.get_pixel(0, top);

        let mut sampled = 0usize;
        let mut deviating = 0usize;
        for y in top..top + rows {
            for x in (0..width).step_by(step as usize) {
                let p = image.get_pixel(x, y);
                let delta: u32 = (0..3)
                    .map(|c| u32::from(p[c].abs_diff(reference[c])))
                    .sum();
                sampled += 1;
                if delta > t.band_color_delta {
                    deviating += 1;
                }
            }
        }

        deviating as f64 / sampled as f64 <= t.band_max_deviation
    }
}

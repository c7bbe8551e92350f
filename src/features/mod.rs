//! Per-image feature extraction.
//!
//! This module turns one decoded image into everything the rest of the
//! pipeline needs:
//! - A 256-bit gradient-hash [`Fingerprint`] for similarity comparison
//! - A [`QualityResult`] with sharpness and exposure scores
//! - A [`TypeLabel`] (photo, screenshot, or document)
//!
//! # Architecture
//!
//! - [`fingerprint`]: gradient hash and Hamming similarity
//! - [`quality`]: Laplacian sharpness and histogram exposure
//! - [`classify`]: document/screenshot/photo rules
//! - [`resample`]: thumbnail resampling and luminance shared by the passes above
//!
//! Extraction is a pure function of the pixel data. The extractor holds only
//! immutable configuration, so one instance can be shared by every worker.
//!
//! # Example
//!
//! ```
//! use image::{DynamicImage, Rgb, RgbImage};
//! use photosift::features::{FeatureExtractor, TypeLabel};
//!
//! let page = DynamicImage::ImageRgb8(RgbImage::from_pixel(800, 1000, Rgb([255, 255, 255])));
//! let features = FeatureExtractor::default().extract(&page).unwrap();
//!
//! assert_eq!(features.image_type, TypeLabel::Document);
//! assert!(features.quality.quality_score <= 100);
//! ```

pub mod classify;
pub mod fingerprint;
pub mod quality;
pub mod resample;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

pub use classify::{Classifier, ClassifierThresholds, PaletteStats, TypeLabel};
pub use fingerprint::{Fingerprint, FINGERPRINT_BITS, FINGERPRINT_BYTES};
pub use quality::QualityResult;

/// Longest side of the working image used for quality and palette statistics.
pub const WORKING_MAX_DIMENSION: u32 = 200;

/// Errors that can occur while extracting features from one image.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    /// The byte buffer could not be decoded as an image.
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// The decoded image has no pixels.
    #[error("Image has zero size ({width}x{height})")]
    EmptyImage {
        /// Decoded width
        width: u32,
        /// Decoded height
        height: u32,
    },

    /// The byte buffer could not be obtained.
    #[error("Failed to read image data: {0}")]
    Read(#[source] std::io::Error),
}

/// Everything extracted from one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageFeatures {
    /// Original width in pixels
    pub width: u32,
    /// Original height in pixels
    pub height: u32,
    /// Gradient hash
    pub fingerprint: Fingerprint,
    /// Sharpness, exposure, and combined quality
    pub quality: QualityResult,
    /// Classified image type
    #[serde(rename = "type")]
    pub image_type: TypeLabel,
}

/// Stateless feature extractor.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    classifier: Classifier,
}

impl FeatureExtractor {
    /// Create an extractor with custom classification thresholds.
    #[must_use]
    pub fn new(thresholds: ClassifierThresholds) -> Self {
        Self {
            classifier: Classifier::new(thresholds),
        }
    }

    /// Decode an encoded image buffer and extract its features.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Decode`] if the format is unsupported or the data
    /// is corrupt, and [`ExtractError::EmptyImage`] for zero-sized images.
    pub fn extract_bytes(&self, bytes: &[u8]) -> Result<ImageFeatures, ExtractError> {
        let image = image::load_from_memory(bytes)?;
        self.extract(&image)
    }

    /// Extract features from a decoded image.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::EmptyImage`] if either dimension is zero.
    pub fn extract(&self, image: &DynamicImage) -> Result<ImageFeatures, ExtractError> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(ExtractError::EmptyImage { width, height });
        }

        let rgb = image.to_rgb8();
        let working = resample::downsample(&rgb, WORKING_MAX_DIMENSION);

        Ok(ImageFeatures {
            width,
            height,
            fingerprint: Fingerprint::from_rgb(&rgb),
            quality: QualityResult::measure(&working),
            image_type: self.classifier.classify(&rgb, &working),
        })
    }

    /// The classification thresholds in use.
    #[must_use]
    pub fn thresholds(&self) -> &ClassifierThresholds {
        self.classifier.thresholds()
    }
}

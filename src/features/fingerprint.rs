//! Gradient-hash fingerprints.
//!
//! # Overview
//!
//! A [`Fingerprint`] is a 256-bit structural signature of an image. The image is
//! resampled to a 17x16 luminance grid and every bit records whether luminance
//! increases from one column to the next. Only the gradient sign matters, so the
//! signature survives rescaling and recompression but not rotation or heavy
//! cropping.
//!
//! Fingerprints are compared exclusively by Hamming distance; there is no
//! ordering between them.
//!
//! # Example
//!
//! ```
//! use image::RgbImage;
//! use photosift::features::Fingerprint;
//!
//! let gray = RgbImage::from_pixel(16, 16, image::Rgb([128, 128, 128]));
//! let fp = Fingerprint::from_rgb(&gray);
//!
//! assert_eq!(fp, Fingerprint::zero());
//! assert_eq!(fp.similarity(&fp), 1.0);
//! ```

use image::RgbImage;
use serde::{Deserialize, Serialize};

use super::resample::luminance_grid;

/// Width of the fingerprint grid (bits per row).
pub const HASH_WIDTH: u32 = 16;

/// Height of the fingerprint grid (rows).
pub const HASH_HEIGHT: u32 = 16;

/// Total number of bits in a fingerprint.
pub const FINGERPRINT_BITS: u32 = HASH_WIDTH * HASH_HEIGHT;

/// Number of bytes in a packed fingerprint.
pub const FINGERPRINT_BYTES: usize = (FINGERPRINT_BITS / 8) as usize;

/// A 256-bit gradient hash, packed MSB-first row by row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint([u8; FINGERPRINT_BYTES]);

impl Fingerprint {
    /// Build a fingerprint from already-packed bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; FINGERPRINT_BYTES]) -> Self {
        Self(bytes)
    }

    /// The all-zero fingerprint produced by images without horizontal gradients.
    #[must_use]
    pub const fn zero() -> Self {
        Self([0; FINGERPRINT_BYTES])
    }

    /// Compute the gradient hash of an RGB image.
    ///
    /// The image is box-resampled with `imageops::thumbnail` to a `(HASH_WIDTH + 1) x HASH_HEIGHT` grid,
    /// so uniform images always produce [`Fingerprint::zero`].
    #[must_use]
    pub fn from_rgb(image: &RgbImage) -> Self {
        let grid_width = HASH_WIDTH + 1;
        let luma = luminance_grid(image, grid_width, HASH_HEIGHT);

        let mut bytes = [0u8; FINGERPRINT_BYTES];
        let mut bit = 0usize;
        for y in 0..HASH_HEIGHT as usize {
            let row = &luma[y * grid_width as usize..(y + 1) * grid_width as usize];
            for x in 0..HASH_WIDTH as usize {
                if row[x] < row[x + 1] {
                    bytes[bit / 8] |= 0x80 >> (bit % 8);
                }
                bit += 1;
            }
        }

        Self(bytes)
    }

    /// The packed fingerprint bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_BYTES] {
        &self.0
    }

    /// Number of differing bits between two fingerprints.
    #[must_use]
    pub fn hamming_distance(&self, other: &Self) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    /// Similarity in `[0, 1]`: `1 - hamming / FINGERPRINT_BITS`.
    #[must_use]
    pub fn similarity(&self, other: &Self) -> f64 {
        1.0 - f64::from(self.hamming_distance(other)) / f64::from(FINGERPRINT_BITS)
    }

    /// Lowercase hex rendering of the packed bytes.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn horizontal_ramp(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, _| {
            let v = (x * 255 / (width - 1)) as u8;
            Rgb([v, v, v])
        })
    }

    #[test]
    fn test_uniform_image_is_zero() {
        let img = RgbImage::from_pixel(16, 16, Rgb([128, 128, 128]));
        assert_eq!(Fingerprint::from_rgb(&img), Fingerprint::zero());
    }

    #[test]
    fn test_uniform_large_image_is_zero() {
        let img = RgbImage::from_pixel(640, 480, Rgb([10, 200, 30]));
        assert_eq!(Fingerprint::from_rgb(&img), Fingerprint::zero());
    }

    #[test]
    fn test_increasing_ramp_sets_all_bits() {
        let img = horizontal_ramp(340, 64);
        let fp = Fingerprint::from_rgb(&img);
        assert_eq!(fp.as_bytes(), &[0xff; FINGERPRINT_BYTES]);
    }

    #[test]
    fn test_decreasing_ramp_is_zero() {
        let img = RgbImage::from_fn(340, 64, |x, _| {
            let v = 255 - (x * 255 / 339) as u8;
            Rgb([v, v, v])
        });
        assert_eq!(Fingerprint::from_rgb(&img), Fingerprint::zero());
    }

    #[test]
    fn test_bits_are_packed_msb_first() {
        // Only the first gradient of the first row is positive.
        let mut bytes = [0u8; FINGERPRINT_BYTES];
        bytes[0] = 0b1000_0000;
        let fp = Fingerprint::from_bytes(bytes);
        assert_eq!(fp.hamming_distance(&Fingerprint::zero()), 1);
        assert_eq!(&fp.to_hex()[..2], "80");
    }

    #[test]
    fn test_hamming_distance_bounds() {
        let zero = Fingerprint::zero();
        let ones = Fingerprint::from_bytes([0xff; FINGERPRINT_BYTES]);
        assert_eq!(zero.hamming_distance(&zero), 0);
        assert_eq!(zero.hamming_distance(&ones), FINGERPRINT_BITS);
        assert_eq!(zero.similarity(&ones), 0.0);
        assert_eq!(ones.similarity(&ones), 1.0);
    }

    #[test]
    fn test_hamming_distance_is_symmetric() {
        let a = Fingerprint::from_bytes([0b1010_1010; FINGERPRINT_BYTES]);
        let b = Fingerprint::from_bytes([0b1111_0000; FINGERPRINT_BYTES]);
        assert_eq!(a.hamming_distance(&b), b.hamming_distance(&a));
        assert_eq!(a.hamming_distance(&b), 4 * FINGERPRINT_BYTES as u32);
    }

    #[test]
    fn test_hex_length() {
        assert_eq!(Fingerprint::zero().to_hex().len(), FINGERPRINT_BYTES * 2);
        assert_eq!(Fingerprint::zero().to_string(), "0".repeat(64));
    }
}

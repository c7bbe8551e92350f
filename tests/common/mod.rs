//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use image::{ImageFormat, Rgb, RgbImage};
use photosift::features::{Fingerprint, FINGERPRINT_BITS, FINGERPRINT_BYTES};
use photosift::progress::{Phase, ProgressCallback, ProgressUpdate};
use photosift::source::ImageId;

/// Small deterministic generator so fixtures are reproducible.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed ^ 0x9E37_79B9_7F4A_7C15)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        let x = self.0;
        x ^ (x >> 33)
    }

    pub fn below(&mut self, n: u64) -> u64 {
        self.next_u64() % n
    }

    pub fn byte(&mut self) -> u8 {
        (self.next_u64() >> 24) as u8
    }
}

pub fn random_fingerprint(rng: &mut Lcg) -> Fingerprint {
    let mut bytes = [0u8; FINGERPRINT_BYTES];
    for b in &mut bytes {
        *b = rng.byte();
    }
    Fingerprint::from_bytes(bytes)
}

/// Copy of `base` with `flips` distinct bits inverted.
pub fn flip_bits(base: &Fingerprint, flips: usize, rng: &mut Lcg) -> Fingerprint {
    let mut bytes = *base.as_bytes();
    let mut flipped = Vec::new();
    while flipped.len() < flips {
        let bit = rng.below(FINGERPRINT_BITS as u64) as usize;
        if flipped.contains(&bit) {
            continue;
        }
        flipped.push(bit);
        bytes[bit / 8] ^= 0x80 >> (bit % 8);
    }
    Fingerprint::from_bytes(bytes)
}

pub fn encode(img: &RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

pub fn png(img: &RgbImage) -> Vec<u8> {
    encode(img, ImageFormat::Png)
}

pub fn gray(width: u32, height: u32, level: u8) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([level, level, level]))
}

/// A smooth scene with structure in both directions.
pub fn scene(width: u32, height: u32, seed: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let v = ((x * 7 + y * 3 + seed * 31) % 256) as u8;
        let w = (((x / 8 + y / 8 + seed) % 2) * 120) as u8;
        Rgb([v, v.wrapping_add(w), 255 - v])
    })
}

/// Smooth two-dimensional wave, gray only.
pub fn waves(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let fx = f64::from(x) / 37.0;
        let fy = f64::from(y) / 23.0;
        let v = (128.0 + 90.0 * fx.sin() * fy.cos() + 20.0 * (fx * 0.3).cos()).round() as u8;
        Rgb([v, v, v])
    })
}

pub fn noise(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = Lcg::new(seed);
    RgbImage::from_fn(width, height, |_, _| Rgb([rng.byte(), rng.byte(), rng.byte()]))
}

/// Records every callback for later assertions.
#[derive(Default)]
pub struct TestProgressCallback {
    pub phases_started: Mutex<Vec<(Phase, usize)>>,
    pub phases_ended: Mutex<Vec<Phase>>,
    pub updates: Mutex<Vec<ProgressUpdate>>,
    pub errors: Mutex<Vec<(ImageId, String)>>,
    pub progress_calls: AtomicUsize,
}

impl TestProgressCallback {
    pub fn updates_for(&self, phase: Phase) -> Vec<ProgressUpdate> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.phase == phase)
            .copied()
            .collect()
    }
}

impl ProgressCallback for TestProgressCallback {
    fn on_phase_start(&self, phase: Phase, total: usize) {
        self.phases_started.lock().unwrap().push((phase, total));
    }

    fn on_progress(&self, update: ProgressUpdate) {
        self.progress_calls.fetch_add(1, Ordering::SeqCst);
        self.updates.lock().unwrap().push(update);
    }

    fn on_item_error(&self, id: &ImageId, message: &str) {
        self.errors
            .lock()
            .unwrap()
            .push((id.clone(), message.to_string()));
    }

    fn on_phase_end(&self, phase: Phase) {
        self.phases_ended.lock().unwrap().push(phase);
    }
}

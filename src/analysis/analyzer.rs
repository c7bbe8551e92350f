//! End-to-end analysis: extraction followed by clustering.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use super::clustering::{cluster, ClusterConfig, ClusterInput};
use super::groups::SimilarityGroup;
use super::pool::{extract_all, ExtractionConfig, ItemError};
use crate::cancel::CancelFlag;
use crate::config::{validate_threshold, AnalysisConfig, ConfigError};
use crate::features::{FeatureExtractor, ImageFeatures, TypeLabel};
use crate::progress::ProgressCallback;
use crate::source::{ImageId, ImageSource};

/// Images per type label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeCounts {
    /// Photographs
    pub photo: usize,
    /// Screenshots
    pub screenshot: usize,
    /// Scanned documents
    pub document: usize,
}

impl TypeCounts {
    fn add(&mut self, label: TypeLabel) {
        match label {
            TypeLabel::Photo => self.photo += 1,
            TypeLabel::Screenshot => self.screenshot += 1,
            TypeLabel::Document => self.document += 1,
        }
    }
}

/// Run-level counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisSummary {
    /// Images handed to the run
    pub images_total: usize,
    /// Distinct image ids with extracted features
    pub images_analyzed: usize,
    /// Images that failed to read or decode
    pub images_failed: usize,
    /// Fingerprint pairs scored
    pub pairs_compared: usize,
    /// Whether clustering used one global bucket
    pub global_fallback: bool,
    /// Type label distribution
    pub types: TypeCounts,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

/// Everything a run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisReport {
    /// Near-duplicate groups, largest first
    pub groups: Vec<SimilarityGroup>,
    /// Features per analyzed image
    pub features: BTreeMap<ImageId, ImageFeatures>,
    /// Images that could not be analyzed
    pub errors: Vec<ItemError>,
    /// Counters
    pub summary: AnalysisSummary,
    /// Whether the run was cancelled; all other fields are then empty
    pub cancelled: bool,
}

impl AnalysisReport {
    fn cancelled(images_total: usize) -> Self {
        Self {
            summary: AnalysisSummary {
                images_total,
                ..AnalysisSummary::default()
            },
            cancelled: true,
            ..Self::default()
        }
    }
}

/// Runs the analysis pipeline over a batch of images.
///
/// # Example
///
/// ```
/// use photosift::analysis::Analyzer;
/// use photosift::config::AnalysisConfig;
/// use photosift::source::ImageDescriptor;
///
/// let mut analyzer = Analyzer::new(AnalysisConfig::default()).unwrap();
/// analyzer.set_similarity_threshold(0.9).unwrap();
/// assert!(analyzer.set_similarity_threshold(1.5).is_err());
///
/// let report = analyzer.analyze::<ImageDescriptor>(&[]);
/// assert!(report.groups.is_empty());
/// ```
pub struct Analyzer {
    config: AnalysisConfig,
    extractor: FeatureExtractor,
    cancel: CancelFlag,
    progress: Option<Arc<dyn ProgressCallback>>,
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyzer")
            .field("config", &self.config)
            .field("cancel", &self.cancel)
            .field("progress", &self.progress.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl Analyzer {
    /// Create an analyzer.
    ///
    /// # Errors
    ///
    /// Returns the first validation error in `config`.
    pub fn new(config: AnalysisConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            extractor: FeatureExtractor::new(config.classifier.clone()),
            config,
            cancel: CancelFlag::new(),
            progress: None,
        })
    }

    /// Use a shared cancellation flag.
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Change the grouping threshold for subsequent runs.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidThreshold`] unless `threshold` is in [0, 1];
    /// the previous value is kept.
    pub fn set_similarity_threshold(&mut self, threshold: f64) -> Result<(), ConfigError> {
        validate_threshold(threshold)?;
        log::debug!("Similarity threshold set to {}", threshold);
        self.config.similarity_threshold = threshold;
        Ok(())
    }

    /// Current grouping threshold.
    #[must_use]
    pub fn similarity_threshold(&self) -> f64 {
        self.config.similarity_threshold
    }

    /// The cancellation flag observed by runs.
    #[must_use]
    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyze a batch of images.
    ///
    /// Item failures are reported in [`AnalysisReport::errors`]. If the
    /// cancellation flag is raised at any point, the report is empty and
    /// marked `cancelled`.
    pub fn analyze<S>(&self, items: &[S]) -> AnalysisReport
    where
        S: ImageSource + Sync,
    {
        let started = Instant::now();

        let mut extraction_config = ExtractionConfig::default()
            .with_workers(self.config.workers)
            .with_progress_interval(self.config.progress_interval())
            .with_cancel_flag(self.cancel.clone())
            .with_extractor(self.extractor.clone());
        if let Some(cb) = &self.progress {
            extraction_config = extraction_config.with_progress_callback(Arc::clone(cb));
        }

        let extraction = extract_all(items, &extraction_config);
        if extraction.cancelled {
            return AnalysisReport::cancelled(items.len());
        }

        let mut features = BTreeMap::new();
        let mut inputs = Vec::with_capacity(extraction.results.len());
        for extracted in extraction.results {
            let Some(item) = items.get(extracted.index) else {
                continue;
            };
            inputs.push(ClusterInput {
                id: item.id().clone(),
                fingerprint: extracted.features.fingerprint,
                created_at: item.created_at().map(str::to_string),
            });
            features
                .entry(item.id().clone())
                .or_insert(extracted.features);
        }

        let mut cluster_config = ClusterConfig::default()
            .with_threshold(self.config.similarity_threshold)
            .with_bucketing(self.config.bucketing)
            .with_progress_interval(self.config.progress_interval())
            .with_cancel_flag(self.cancel.clone());
        if let Some(cb) = &self.progress {
            cluster_config = cluster_config.with_progress_callback(Arc::clone(cb));
        }

        let clustered = cluster(&inputs, &cluster_config);
        if clustered.cancelled {
            return AnalysisReport::cancelled(items.len());
        }

        let mut types = TypeCounts::default();
        for f in features.values() {
            types.add(f.image_type);
        }

        let summary = AnalysisSummary {
            images_total: items.len(),
            images_analyzed: features.len(),
            images_failed: extraction.errors.len(),
            pairs_compared: clustered.stats.pairs_compared,
            global_fallback: clustered.stats.global_fallback,
            types,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        log::info!(
            "Analysis finished: {} groups, {} analyzed, {} failed in {}ms",
            clustered.groups.len(),
            summary.images_analyzed,
            summary.images_failed,
            summary.duration_ms
        );

        AnalysisReport {
            groups: clustered.groups,
            features,
            errors: extraction.errors,
            summary,
            cancelled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ImageDescriptor;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn png(img: &RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = AnalysisConfig {
            similarity_threshold: 2.0,
            ..AnalysisConfig::default()
        };
        assert!(Analyzer::new(config).is_err());
    }

    #[test]
    fn test_set_threshold_keeps_old_value_on_error() {
        let mut analyzer = Analyzer::new(AnalysisConfig::default()).unwrap();
        assert!(analyzer.set_similarity_threshold(-1.0).is_err());
        assert!((analyzer.similarity_threshold() - 0.85).abs() < f64::EPSILON);
        analyzer.set_similarity_threshold(0.5).unwrap();
        assert!((analyzer.similarity_threshold() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_analyze_gray_images() {
        let gray = png(&RgbImage::from_pixel(16, 16, Rgb([128, 128, 128])));
        let items: Vec<ImageDescriptor> = (0..3)
            .map(|i| ImageDescriptor::from_bytes(format!("g{}", i), format!("g{}.png", i), gray.clone()))
            .chain(std::iter::once(ImageDescriptor::from_bytes(
                "broken",
                "broken.png",
                b"xx".to_vec(),
            )))
            .collect();

        let report = Analyzer::new(AnalysisConfig::default()).unwrap().analyze(&items);

        assert!(!report.cancelled);
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].len(), 3);
        assert!((report.groups[0].similarity - 1.0).abs() < f64::EPSILON);
        assert_eq!(report.features.len(), 3);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.summary.images_total, 4);
        assert_eq!(report.summary.images_analyzed, 3);
        assert_eq!(report.summary.images_failed, 1);
        assert_eq!(report.summary.types.photo, 3);
    }

    #[test]
    fn test_analyze_cancelled() {
        let gray = png(&RgbImage::from_pixel(16, 16, Rgb([128, 128, 128])));
        let items = vec![ImageDescriptor::from_bytes("a", "a.png", gray)];
        let cancel = CancelFlag::new();
        cancel.cancel();
        let report = Analyzer::new(AnalysisConfig::default())
            .unwrap()
            .with_cancel_flag(cancel)
            .analyze(&items);
        assert!(report.cancelled);
        assert!(report.features.is_empty());
        assert!(report.errors.is_empty());
    }
}

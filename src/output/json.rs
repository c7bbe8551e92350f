//! JSON report for scripting.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "groups": [
//!     { "id": "group_0", "members": ["a.jpg", "b.jpg"], "similarity": 0.96 }
//!   ],
//!   "images": {
//!     "a.jpg": {
//!       "width": 4032, "height": 3024,
//!       "fingerprint": "00ff...",
//!       "blur_score": 81, "exposure_score": 74, "quality_score": 79,
//!       "type": "photo"
//!     }
//!   },
//!   "errors": [{ "id": "c.heic", "filename": "c.heic", "message": "..." }],
//!   "summary": { "images_total": 3, "images_analyzed": 2, "...": "...",
//!                "exit_code": 3, "exit_code_name": "PS003" }
//! }
//! ```

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;

use crate::analysis::{AnalysisReport, AnalysisSummary, ItemError, SimilarityGroup};
use crate::error::ExitCode;
use crate::features::{ImageFeatures, TypeLabel};
use crate::source::ImageId;

/// Per-image entry with a hex fingerprint and flattened scores.
#[derive(Debug, Clone, Serialize)]
pub struct JsonImage {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Fingerprint as 64 hex characters
    pub fingerprint: String,
    /// Sharpness score
    pub blur_score: u8,
    /// Exposure score
    pub exposure_score: u8,
    /// Combined quality score
    pub quality_score: u8,
    /// Image type
    #[serde(rename = "type")]
    pub image_type: TypeLabel,
}

impl From<&ImageFeatures> for JsonImage {
    fn from(f: &ImageFeatures) -> Self {
        Self {
            width: f.width,
            height: f.height,
            fingerprint: f.fingerprint.to_hex(),
            blur_score: f.quality.blur_score,
            exposure_score: f.quality.exposure_score,
            quality_score: f.quality.quality_score,
            image_type: f.image_type,
        }
    }
}

/// Summary plus exit status.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Run counters
    #[serde(flatten)]
    pub counters: AnalysisSummary,
    /// Number of groups
    pub groups: usize,
    /// Whether the run was cancelled
    pub interrupted: bool,
    /// Process exit code
    pub exit_code: i32,
    /// Machine-readable exit code name
    pub exit_code_name: String,
}

/// Complete JSON document.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput<'a> {
    /// Similarity groups
    pub groups: &'a [SimilarityGroup],
    /// Features per image id
    pub images: BTreeMap<&'a ImageId, JsonImage>,
    /// Failed images
    pub errors: &'a [ItemError],
    /// Summary
    pub summary: JsonSummary,
}

impl<'a> JsonOutput<'a> {
    /// Build the document for a report.
    #[must_use]
    pub fn new(report: &'a AnalysisReport, exit_code: ExitCode) -> Self {
        Self {
            groups: &report.groups,
            images: report
                .features
                .iter()
                .map(|(id, f)| (id, JsonImage::from(f)))
                .collect(),
            errors: &report.errors,
            summary: JsonSummary {
                counters: report.summary.clone(),
                groups: report.groups.len(),
                interrupted: report.cancelled,
                exit_code: exit_code.as_i32(),
                exit_code_name: exit_code.code_prefix().to_string(),
            },
        }
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the document followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), JsonOutputError> {
        serde_json::to_writer_pretty(&mut *writer, self)?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}

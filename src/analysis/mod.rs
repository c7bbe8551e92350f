//! The analysis pipeline.
//!
//! # Phases
//!
//! 1. **Extraction** ([`pool`]): features for every image, computed on a
//!    bounded worker pool with throttled progress and cancellation.
//! 2. **Comparison** ([`clustering`]): day-bucketed pairwise fingerprint
//!    comparison and union-find grouping.
//!
//! [`Analyzer`] runs both phases and assembles an [`AnalysisReport`].

pub mod analyzer;
pub mod clustering;
pub mod groups;
pub mod pool;

pub use analyzer::{AnalysisReport, AnalysisSummary, Analyzer, TypeCounts};
pub use clustering::{cluster, BucketKey, ClusterConfig, ClusterInput, ClusterOutcome, ClusterStats};
pub use groups::SimilarityGroup;
pub use pool::{
    effective_workers, extract_all, ExtractedImage, ExtractionConfig, ExtractionOutcome,
    ItemError, MAX_WORKERS,
};

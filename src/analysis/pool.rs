//! Parallel feature extraction.
//!
//! A dedicated rayon pool of `C` workers pulls item indices from one shared
//! crossbeam queue. Each worker reads the item's bytes, runs the
//! [`FeatureExtractor`], and sends the outcome back over a result channel.
//! The calling thread acts as coordinator: it drains results, reports
//! throttled progress, and forwards per-item failures.
//!
//! Workers check the [`CancelFlag`] before taking the next item. Work already
//! in flight is allowed to finish, and a cancelled run yields an empty
//! outcome rather than the items completed so far.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;

use crate::cancel::CancelFlag;
use crate::features::{ExtractError, FeatureExtractor, ImageFeatures};
use crate::progress::{
    Phase, ProgressCallback, ProgressThrottle, ProgressUpdate, DEFAULT_PROGRESS_INTERVAL,
};
use crate::source::{ImageId, ImageSource};

/// Hard cap on extraction workers.
pub const MAX_WORKERS: usize = 8;

/// Worker count actually used for `items` images.
///
/// Bounded by the request, available parallelism, the item count and
/// [`MAX_WORKERS`]; never less than one.
#[must_use]
pub fn effective_workers(requested: usize, items: usize) -> usize {
    let available = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    requested.min(available).min(items).min(MAX_WORKERS).max(1)
}

/// Settings for one extraction run.
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Requested worker count
    pub workers: usize,
    /// Minimum interval between progress updates
    pub progress_interval: Duration,
    /// Cancellation signal
    pub cancel: CancelFlag,
    /// Optional progress receiver
    pub progress: Option<Arc<dyn ProgressCallback>>,
    /// Extractor shared by all workers
    pub extractor: FeatureExtractor,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            workers: MAX_WORKERS,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            cancel: CancelFlag::new(),
            progress: None,
            extractor: FeatureExtractor::default(),
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("workers", &self.workers)
            .field("progress_interval", &self.progress_interval)
            .field("cancel", &self.cancel)
            .field("progress", &self.progress.as_ref().map(|_| "<callback>"))
            .field("extractor", &self.extractor)
            .finish()
    }
}

impl ExtractionConfig {
    /// Set the requested worker count (minimum 1).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the progress throttle interval.
    #[must_use]
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
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

    /// Use a specific extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: FeatureExtractor) -> Self {
        self.extractor = extractor;
        self
    }
}

/// Features for the item at `index` in the input slice.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedImage {
    /// Position in the input
    pub index: usize,
    /// Extracted features
    pub features: ImageFeatures,
}

/// An image that could not be analyzed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    /// Image id
    pub id: ImageId,
    /// Filename for display
    pub filename: String,
    /// Failure description
    pub message: String,
}

/// Result of an extraction run.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    /// Successful extractions, ordered by input index
    pub results: Vec<ExtractedImage>,
    /// Items that failed to read or decode
    pub errors: Vec<ItemError>,
    /// Whether the run was cancelled (results and errors are then empty)
    pub cancelled: bool,
}

impl ExtractionOutcome {
    fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Self::default()
        }
    }
}

struct WorkerMessage {
    index: usize,
    outcome: Result<ImageFeatures, ExtractError>,
}

/// Extract features from every item in parallel.
///
/// Item failures are collected in [`ExtractionOutcome::errors`] and reported
/// through [`ProgressCallback::on_item_error`]; they never stop the run.
pub fn extract_all<S>(items: &[S], config: &ExtractionConfig) -> ExtractionOutcome
where
    S: ImageSource + Sync,
{
    let total = items.len();
    let progress = config.progress.as_deref();

    if let Some(cb) = progress {
        cb.on_phase_start(Phase::Extracting, total);
    }

    if config.cancel.is_cancelled() {
        log::info!("Extraction cancelled before start");
        if let Some(cb) = progress {
            cb.on_phase_end(Phase::Extracting);
        }
        return ExtractionOutcome::cancelled();
    }

    if total == 0 {
        if let Some(cb) = progress {
            cb.on_progress(ProgressUpdate {
                current: 0,
                total: 0,
                phase: Phase::Extracting,
            });
            cb.on_phase_end(Phase::Extracting);
        }
        return ExtractionOutcome::default();
    }

    let workers = effective_workers(config.workers, total);
    log::info!(
        "Phase 1: extracting features from {} images with {} workers",
        total,
        workers
    );

    let (job_tx, job_rx) = crossbeam_channel::unbounded::<usize>();
    for index in 0..total {
        // The receiver is alive, so an unbounded send cannot fail.
        let _ = job_tx.send(index);
    }
    drop(job_tx);

    let (result_tx, result_rx) = crossbeam_channel::unbounded::<WorkerMessage>();

    let outcome = match rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("photosift-extract-{}", i))
        .build()
    {
        Ok(pool) => pool.in_place_scope(|scope| {
            run_scoped(scope, items, config, &job_rx, result_tx, &result_rx, workers)
        }),
        Err(e) => {
            log::warn!("Failed to build extraction pool ({}), using global pool", e);
            rayon::in_place_scope(|scope| {
                run_scoped(scope, items, config, &job_rx, result_tx, &result_rx, workers)
            })
        }
    };

    if let Some(cb) = progress {
        cb.on_phase_end(Phase::Extracting);
    }
    outcome
}

fn run_scoped<'scope, S>(
    scope: &rayon::Scope<'scope>,
    items: &'scope [S],
    config: &'scope ExtractionConfig,
    jobs: &Receiver<usize>,
    results: Sender<WorkerMessage>,
    results_rx: &Receiver<WorkerMessage>,
    workers: usize,
) -> ExtractionOutcome
where
    S: ImageSource + Sync,
{
    let extractor = &config.extractor;
    let cancel = &config.cancel;
    for _ in 0..workers {
        let jobs = jobs.clone();
        let results = results.clone();
        scope.spawn(move |_| worker_loop(items, extractor, cancel, &jobs, &results));
    }
    // Workers hold the remaining senders; draining ends once they all exit.
    drop(results);
    coordinate(items, config, results_rx)
}

fn worker_loop<S: ImageSource>(
    items: &[S],
    extractor: &FeatureExtractor,
    cancel: &CancelFlag,
    jobs: &Receiver<usize>,
    results: &Sender<WorkerMessage>,
) {
    while !cancel.is_cancelled() {
        let Ok(index) = jobs.try_recv() else {
            break;
        };
        let Some(item) = items.get(index) else {
            continue;
        };

        let outcome = item
            .read_bytes()
            .map_err(ExtractError::Read)
            .and_then(|bytes| extractor.extract_bytes(&bytes));

        if results.send(WorkerMessage { index, outcome }).is_err() {
            break;
        }
    }
}

fn coordinate<S: ImageSource>(
    items: &[S],
    config: &ExtractionConfig,
    results: &Receiver<WorkerMessage>,
) -> ExtractionOutcome {
    let total = items.len();
    let progress = config.progress.as_deref();
    let mut throttle = ProgressThrottle::new(config.progress_interval);
    let mut completed = 0usize;
    let mut outcome = ExtractionOutcome::default();

    for message in results.iter() {
        completed += 1;
        let cancelled = config.cancel.is_cancelled();

        match message.outcome {
            Ok(features) => outcome.results.push(ExtractedImage {
                index: message.index,
                features,
            }),
            Err(e) => {
                let Some(item) = items.get(message.index) else {
                    continue;
                };
                let error = ItemError {
                    id: item.id().clone(),
                    filename: item.filename().to_string(),
                    message: e.to_string(),
                };
                log::warn!("Skipping {}: {}", error.filename, error.message);
                if !cancelled {
                    if let Some(cb) = progress {
                        cb.on_item_error(&error.id, &error.message);
                    }
                }
                outcome.errors.push(error);
            }
        }

        if cancelled {
            continue;
        }
        if let Some(cb) = progress {
            if throttle.should_emit(completed, total) {
                cb.on_progress(ProgressUpdate {
                    current: completed,
                    total,
                    phase: Phase::Extracting,
                });
            }
        }
    }

    if config.cancel.is_cancelled() {
        log::info!(
            "Extraction cancelled after {} of {} images; discarding results",
            completed,
            total
        );
        return ExtractionOutcome::cancelled();
    }

    outcome.results.sort_by_key(|r| r.index);
    log::info!(
        "Extracted {} images ({} failed)",
        outcome.results.len(),
        outcome.errors.len()
    );
    outcome
}

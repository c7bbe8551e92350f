//! Progress reporting for the analysis phases.
//!
//! The pipeline reports through the [`ProgressCallback`] trait. Updates come
//! from a single coordinating thread per phase, so `current` never decreases
//! within a phase. Emission is rate-limited by [`ProgressThrottle`] to roughly
//! fifteen updates per second; the final update of a phase is always sent.
//!
//! [`TerminalProgress`] renders the phases as `indicatif` bars for the CLI.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::source::ImageId;

/// Default minimum interval between progress emissions.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(66);

/// Pipeline phase being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Decoding images and extracting features.
    Extracting,
    /// Comparing fingerprints and building groups.
    Comparing,
}

impl Phase {
    /// Lowercase phase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extracting => "extracting",
            Self::Comparing => "comparing",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    /// Items (or pairs) completed so far
    pub current: usize,
    /// Total items (or estimated pairs)
    pub total: usize,
    /// Phase this update belongs to
    pub phase: Phase,
}

/// Receives progress and per-item error notifications.
///
/// Implementations must be cheap; they are called from the coordinating
/// thread between result messages.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    fn on_phase_start(&self, _phase: Phase, _total: usize) {}

    /// Called with a (throttled) progress update.
    fn on_progress(&self, update: ProgressUpdate);

    /// Called once for every image that failed to read or decode.
    fn on_item_error(&self, _id: &ImageId, _message: &str) {}

    /// Called when a phase finishes, including when it was cancelled.
    fn on_phase_end(&self, _phase: Phase) {}
}

/// Rate limiter for progress emissions.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl ProgressThrottle {
    /// Create a throttle with the given minimum interval.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    /// Decide whether to emit an update for `current` of `total`.
    ///
    /// Completion (`current >= total`) always emits. Otherwise an update is
    /// emitted when none has been sent yet or the interval has elapsed.
    pub fn should_emit(&mut self, current: usize, total: usize) -> bool {
        let now = Instant::now();
        let due = current >= total
            || self
                .last_emit
                .is_none_or(|last| now.duration_since(last) >= self.interval);
        if due {
            self.last_emit = Some(now);
        }
        due
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_INTERVAL)
    }
}

/// Terminal progress bars using indicatif.
pub struct TerminalProgress {
    multi: MultiProgress,
    bar: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl TerminalProgress {
    /// Create a reporter; `quiet` suppresses all bars.
    ///
    /// # Examples
    ///
    /// ```
    /// use photosift::progress::TerminalProgress;
    ///
    /// let progress = TerminalProgress::new(true);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            bar: Mutex::new(None),
            quiet,
        }
    }

    fn style(phase: Phase) -> ProgressStyle {
        let template = match phase {
            Phase::Extracting => {
                "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} images ({percent}%) {msg} (ETA: {eta})"
            }
            Phase::Comparing => {
                "[{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} pairs ({percent}%) {msg}"
            }
        };
        ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-")
    }

    fn with_bar(&self, f: impl FnOnce(&mut Option<ProgressBar>)) {
        if let Ok(mut guard) = self.bar.lock() {
            f(&mut guard);
        }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_phase_start(&self, phase: Phase, total: usize) {
        if self.quiet {
            return;
        }
        let pb = self.multi.add(ProgressBar::new(total as u64));
        pb.set_style(Self::style(phase));
        pb.set_message(match phase {
            Phase::Extracting => "Analyzing",
            Phase::Comparing => "Comparing",
        });
        self.with_bar(|bar| *bar = Some(pb));
    }

    fn on_progress(&self, update: ProgressUpdate) {
        if self.quiet {
            return;
        }
        self.with_bar(|bar| {
            if let Some(pb) = bar.as_ref() {
                pb.set_length(update.total as u64);
                pb.set_position(update.current as u64);
            }
        });
    }

    fn on_item_error(&self, id: &ImageId, message: &str) {
        if self.quiet {
            return;
        }
        self.with_bar(|bar| {
            if let Some(pb) = bar.as_ref() {
                pb.println(format!("skipped {}: {}", id, message));
            }
        });
    }

    fn on_phase_end(&self, phase: Phase) {
        if self.quiet {
            return;
        }
        self.with_bar(|bar| {
            if let Some(pb) = bar.take() {
                pb.finish_with_message(match phase {
                    Phase::Extracting => "Analysis complete",
                    Phase::Comparing => "Comparison complete",
                });
            }
        });
    }
}

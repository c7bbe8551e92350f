//! Cooperative cancellation and Ctrl+C handling.
//!
//! A [`CancelFlag`] is a cloneable handle around a shared `AtomicBool`. The
//! worker pool checks it before dispatching each item and the clustering pass
//! checks it between buckets. Raising it never interrupts work already in
//! flight; it only stops new work from starting, after which the run returns
//! an empty result.
//!
//! # Usage
//!
//! ```rust,no_run
//! use photosift::cancel::install_handler;
//!
//! let cancel = install_handler().expect("Failed to install signal handler");
//!
//! // Hand clones to the analyzer; Ctrl+C raises all of them at once.
//! let for_analyzer = cancel.clone();
//! if for_analyzer.is_cancelled() {
//!     return;
//! }
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Exit code for SIGINT (Ctrl+C) interruption (128 + SIGINT).
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Shared cancellation signal.
///
/// Clones observe and raise the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    /// Create a flag that is not raised.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether the flag has been raised.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Lower the flag so the handle can be reused for another run.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_FLAG: OnceLock<CancelFlag> = OnceLock::new();

/// Install a Ctrl+C handler that raises a process-wide [`CancelFlag`].
///
/// Calling this more than once returns the already-installed flag, lowered
/// again so the new run starts clean. If another component already owns the
/// Ctrl+C hook, an unhooked flag is returned; it still works for manual
/// cancellation.
///
/// # Errors
///
/// Installation failures are absorbed as described above; the `Result` is
/// kept so callers can propagate with `?` should that policy change.
pub fn install_handler() -> Result<CancelFlag, SignalError> {
    if let Some(flag) = GLOBAL_FLAG.get() {
        flag.reset();
        return Ok(flag.clone());
    }

    let flag = CancelFlag::new();
    let hooked = flag.clone();

    match ctrlc::set_handler(move || {
        hooked.cancel();
        let _ = writeln!(std::io::stderr(), "\nInterrupted. Finishing in-flight images...");
        let _ = std::io::stderr().flush();
        log::info!("Cancellation requested by signal");
    }) {
        Ok(()) => {
            let _ = GLOBAL_FLAG.set(flag.clone());
            Ok(GLOBAL_FLAG.get().cloned().unwrap_or(flag))
        }
        Err(e) => {
            log::debug!("Ctrl+C handler unavailable ({}), using unhooked flag", e);
            let fallback = GLOBAL_FLAG.get_or_init(CancelFlag::new);
            fallback.reset();
            Ok(fallback.clone())
        }
    }
}

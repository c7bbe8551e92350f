//! Run-level errors and process exit codes.

use serde::Serialize;

/// Failures that abort a whole analysis run.
///
/// Per-image problems never surface here; they are collected as
/// [`crate::analysis::ItemError`]s instead.
#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// No input paths produced any image.
    #[error("No supported images found in the given paths")]
    NoImages,

    /// An input path does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(std::path::PathBuf),

    /// The run was cancelled by the user.
    #[error("Analysis interrupted by user")]
    Interrupted,
}

/// Exit codes for the `photosift` binary.
///
/// - 0: groups found
/// - 1: unexpected failure
/// - 2: completed, no similar groups
/// - 3: completed, but some images could not be analyzed
/// - 130: interrupted (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Groups were found.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// No similar groups were found.
    NoDuplicates = 2,
    /// Finished with per-image failures.
    PartialSuccess = 3,
    /// Interrupted by the user.
    Interrupted = 130,
}

impl ExitCode {
    /// Numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Machine-readable code used in JSON error output.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "PS000",
            Self::GeneralError => "PS001",
            Self::NoDuplicates => "PS002",
            Self::PartialSuccess => "PS003",
            Self::Interrupted => "PS130",
        }
    }
}

/// Error object printed by `--json-errors`.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// Code such as "PS001"
    pub code: String,
    /// Process exit code
    pub exit_code: i32,
    /// Human-readable message
    pub message: String,
    /// Whether the run was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Build from an error and the exit code it maps to.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{:#}", err),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}

/// Map an error from `run_app` to its exit code.
#[must_use]
pub fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<AnalysisError>() {
        Some(AnalysisError::Interrupted) => ExitCode::Interrupted,
        _ => ExitCode::GeneralError,
    }
}

//! Analysis configuration.
//!
//! Settings are layered with figment, lowest priority first:
//!
//! 1. Built-in defaults ([`AnalysisConfig::default`])
//! 2. A TOML file: `--config <FILE>` or `config.toml` in the platform config dir
//! 3. Environment variables prefixed `PHOTOSIFT_` (`__` separates nested keys,
//!    e.g. `PHOTOSIFT_CLASSIFIER__DOCUMENT_WHITE_FRACTION=0.6`)
//! 4. Command-line flags, applied by the caller after loading
//!
//! ```toml
//! similarity_threshold = 0.9
//! workers = 4
//! bucketing = "global"
//!
//! [classifier]
//! document_white_fraction = 0.6
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::features::ClassifierThresholds;

/// Default similarity threshold for grouping.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "PHOTOSIFT_";

/// Errors raised while loading or validating configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Threshold outside [0, 1] (or NaN).
    #[error("Similarity threshold must be between 0 and 1, got {0}")]
    InvalidThreshold(f64),

    /// Worker count of zero.
    #[error("Worker count must be at least 1")]
    InvalidWorkers,

    /// A provider failed to parse or extract.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// The platform config directory could not be determined.
    #[error("Failed to determine project directories")]
    NoConfigDir,
}

/// How the clustering pass partitions images before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketingMode {
    /// Day buckets, with automatic fallback to one global bucket.
    #[default]
    Auto,
    /// Always compare every image against every other.
    Global,
}

/// Settings for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Minimum similarity for two images to be linked.
    pub similarity_threshold: f64,
    /// Requested worker count (further capped by the pool).
    pub workers: usize,
    /// Minimum milliseconds between progress updates.
    pub progress_interval_ms: u64,
    /// Bucketing strategy.
    pub bucketing: BucketingMode,
    /// Classification thresholds.
    pub classifier: ClassifierThresholds,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            progress_interval_ms: 66,
            bucketing: BucketingMode::Auto,
            classifier: ClassifierThresholds::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load the layered configuration.
    ///
    /// With `path == None` the platform config file is used if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if a layer is malformed and any
    /// validation error from [`AnalysisConfig::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        match path {
            Some(explicit) => {
                log::debug!("Loading configuration from {}", explicit.display());
                figment = figment.merge(Toml::file_exact(explicit));
            }
            None => match Self::default_path() {
                Ok(default) if default.exists() => {
                    log::debug!("Loading configuration from {}", default.display());
                    figment = figment.merge(Toml::file(default));
                }
                Ok(_) => {}
                Err(e) => log::debug!("No platform config file: {}", e),
            },
        }

        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidThreshold`] or [`ConfigError::InvalidWorkers`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_threshold(self.similarity_threshold)?;
        if self.workers == 0 {
            return Err(ConfigError::InvalidWorkers);
        }
        Ok(())
    }

    /// Progress interval as a `Duration`.
    #[must_use]
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Platform-specific default config file path.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NoConfigDir`] if no home directory can be resolved.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dirs = ProjectDirs::from("com", "photosift", "photosift").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// Check that a similarity threshold lies in [0, 1].
///
/// # Errors
///
/// [`ConfigError::InvalidThreshold`] for out-of-range or NaN values.
pub fn validate_threshold(threshold: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(ConfigError::InvalidThreshold(threshold))
    }
}

//! Command-line interface definitions.
//!
//! ```bash
//! # Analyze a folder and print groups
//! photosift analyze ~/Pictures
//!
//! # Stricter grouping, JSON for scripting
//! photosift analyze ~/Pictures --threshold 0.92 --output json
//!
//! # Compare everything against everything
//! photosift -v analyze a.jpg b.jpg ~/Camera --global-bucket
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Near-duplicate photo analysis.
///
/// Fingerprints every image, scores sharpness and exposure, tells photos from
/// screenshots and scanned documents, and groups near-duplicates.
#[derive(Debug, Parser)]
#[command(name = "photosift")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print errors as JSON objects on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Analyze images and group near-duplicates
    Analyze(AnalyzeArgs),
}

/// Arguments for `analyze`.
#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Image files or directories to analyze
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Similarity threshold in [0, 1] for grouping (default: 0.85)
    #[arg(short, long, value_name = "T", value_parser = parse_threshold)]
    pub threshold: Option<f64>,

    /// Number of extraction workers (capped at 8)
    #[arg(short, long, value_name = "N")]
    pub workers: Option<usize>,

    /// Compare all images in one bucket instead of by capture day
    #[arg(long)]
    pub global_bucket: bool,

    /// Configuration file (TOML)
    #[arg(long, value_name = "FILE", env = "PHOTOSIFT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Do not descend into subdirectories
    #[arg(long)]
    pub no_recursive: bool,
}

/// Report format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// JSON report
    Json,
}

fn parse_threshold(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", s))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("threshold must be between 0 and 1, got {}", value))
    }
}

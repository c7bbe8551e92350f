//! PhotoSift - near-duplicate photo analysis
//!
//! Computes a 256-bit gradient-hash fingerprint, sharpness and exposure
//! scores, and a photo/screenshot/document label for every image, then
//! groups near-duplicates with day-bucketed union-find clustering.
//!
//! The library entry point is [`analysis::Analyzer`]; the `photosift` binary
//! wraps it with [`run_app`].

pub mod analysis;
pub mod cancel;
pub mod cli;
pub mod collect;
pub mod config;
pub mod error;
pub mod features;
pub mod logging;
pub mod output;
pub mod progress;
pub mod source;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};

use analysis::Analyzer;
use cli::{AnalyzeArgs, Cli, Commands, OutputFormat};
use collect::{collect_images, CollectOptions};
use config::{AnalysisConfig, BucketingMode};
use error::{AnalysisError, ExitCode};
use output::{JsonOutput, TextOutput};
use progress::TerminalProgress;

/// Run the command-line application.
///
/// # Errors
///
/// Returns an error for invalid configuration, missing paths, an empty image
/// set, interruption, or a failure writing the report.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    match cli.command {
        Commands::Analyze(args) => run_analyze(&args, cli.quiet),
    }
}

fn run_analyze(args: &AnalyzeArgs, quiet: bool) -> Result<ExitCode> {
    let mut config =
        AnalysisConfig::load(args.config.as_deref()).context("Invalid configuration")?;
    if let Some(threshold) = args.threshold {
        config.similarity_threshold = threshold;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if args.global_bucket {
        config.bucketing = BucketingMode::Global;
    }
    log::debug!("Effective configuration: {:?}", config);

    let cancel = cancel::install_handler()?;

    let images = collect_images(
        &args.paths,
        &CollectOptions {
            recursive: !args.no_recursive,
            cancel: Some(cancel.clone()),
        },
    )?;
    if images.is_empty() {
        return Err(AnalysisError::NoImages.into());
    }

    let analyzer = Analyzer::new(config)?
        .with_cancel_flag(cancel)
        .with_progress_callback(Arc::new(TerminalProgress::new(quiet)));
    let report = analyzer.analyze(&images);

    if report.cancelled {
        return Err(AnalysisError::Interrupted.into());
    }

    let exit_code = if !report.errors.is_empty() {
        ExitCode::PartialSuccess
    } else if report.groups.is_empty() {
        ExitCode::NoDuplicates
    } else {
        ExitCode::Success
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match args.output {
        OutputFormat::Text => TextOutput::new(&report).write_to(&mut out)?,
        OutputFormat::Json => JsonOutput::new(&report, exit_code).write_to(&mut out)?,
    }
    out.flush()?;

    Ok(exit_code)
}

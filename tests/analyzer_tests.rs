mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use common::{gray, noise, png, scene, waves, TestProgressCallback};
use image::imageops::{self, FilterType};
use image::RgbImage;
use photosift::analysis::Analyzer;
use photosift::cli::Cli;
use photosift::collect::{collect_images, CollectOptions};
use photosift::config::{AnalysisConfig, BucketingMode};
use photosift::error::{AnalysisError, ExitCode};
use photosift::features::TypeLabel;
use photosift::progress::Phase;
use photosift::source::{ImageDescriptor, ImageId};
use tempfile::tempdir;

fn save(dir: &Path, name: &str, img: &RgbImage) {
    img.save(dir.join(name)).unwrap();
}

fn config() -> AnalysisConfig {
    AnalysisConfig {
        workers: 4,
        ..AnalysisConfig::default()
    }
}

#[test]
fn test_end_to_end_on_directory() {
    let dir = tempdir().unwrap();
    let base = waves(320, 240);
    save(dir.path(), "beach.png", &base);
    save(
        dir.path(),
        "beach_small.png",
        &imageops::resize(&base, 160, 120, FilterType::Triangle),
    );
    save(dir.path(), "beach.bmp", &base);
    save(dir.path(), "forest.png", &noise(300, 200, 2));
    save(dir.path(), "page.png", &RgbImage::from_pixel(800, 1000, image::Rgb([255, 255, 255])));
    fs::write(dir.path().join("corrupt.jpg"), b"\xff\xd8\xff\xe0 not really").unwrap();
    fs::write(dir.path().join("readme.txt"), b"ignored").unwrap();

    let images = collect_images(&[dir.path().to_path_buf()], &CollectOptions::default()).unwrap();
    assert_eq!(images.len(), 6);

    let recorder = Arc::new(TestProgressCallback::default());
    let report = Analyzer::new(config())
        .unwrap()
        .with_progress_callback(recorder.clone())
        .analyze(&images);

    assert!(!report.cancelled);
    assert_eq!(report.summary.images_total, 6);
    assert_eq!(report.summary.images_analyzed, 5);
    assert_eq!(report.summary.images_failed, 1);
    assert_eq!(report.errors[0].filename, "corrupt.jpg");

    assert_eq!(report.groups.len(), 1);
    let names: Vec<String> = report.groups[0]
        .members
        .iter()
        .map(|id| Path::new(id.as_str()).file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["beach.bmp", "beach.png", "beach_small.png"]);
    assert!(report.groups[0].similarity >= 0.85);

    let page_id = ImageId::new(dir.path().join("page.png").to_string_lossy());
    assert_eq!(report.features[&page_id].image_type, TypeLabel::Document);
    assert_eq!(report.summary.types.document, 1);

    let started = recorder.phases_started.lock().unwrap().clone();
    assert_eq!(started[0], (Phase::Extracting, 6));
    assert_eq!(started[1].0, Phase::Comparing);
    assert_eq!(recorder.errors.lock().unwrap().len(), 1);
}

#[test]
fn test_timestamps_drive_bucketing() {
    let gray_png = png(&gray(16, 16, 128));
    let items = vec![
        ImageDescriptor::from_bytes("a", "a.png", gray_png.clone()).with_created_at("2024-01-01T08:00:00Z"),
        ImageDescriptor::from_bytes("b", "b.png", gray_png.clone()).with_created_at("2024-01-02T08:00:00Z"),
        ImageDescriptor::from_bytes("c", "c.png", gray_png.clone()).with_created_at("2024-02-20T08:00:00Z"),
    ];

    let auto = Analyzer::new(config()).unwrap().analyze(&items);
    assert_eq!(auto.groups.len(), 1);
    assert_eq!(auto.groups[0].members, vec![ImageId::new("a"), ImageId::new("b")]);
    assert!(!auto.summary.global_fallback);

    let global = Analyzer::new(AnalysisConfig {
        bucketing: BucketingMode::Global,
        ..config()
    })
    .unwrap()
    .analyze(&items);
    assert_eq!(global.groups[0].len(), 3);
}

#[test]
fn test_threshold_between_runs() {
    let base = scene(200, 150, 3);
    let items = vec![
        ImageDescriptor::from_bytes("x", "x.png", png(&base)),
        ImageDescriptor::from_bytes("y", "y.png", png(&imageops::blur(&base, 1.5))),
    ];

    let mut analyzer = Analyzer::new(config()).unwrap();
    analyzer.set_similarity_threshold(0.0).unwrap();
    assert_eq!(analyzer.analyze(&items).groups.len(), 1);

    analyzer.set_similarity_threshold(1.0).unwrap();
    let strict = analyzer.analyze(&items);
    let fx = strict.features[&ImageId::new("x")].fingerprint;
    let fy = strict.features[&ImageId::new("y")].fingerprint;
    assert_eq!(strict.groups.is_empty(), fx != fy);
}

#[test]
fn test_duplicate_ids_collapse() {
    let bytes = png(&gray(16, 16, 100));
    let items = vec![
        ImageDescriptor::from_bytes("same", "one.png", bytes.clone()),
        ImageDescriptor::from_bytes("same", "two.png", bytes),
    ];
    let report = Analyzer::new(config()).unwrap().analyze(&items);
    assert!(report.groups.is_empty());
    assert_eq!(report.features.len(), 1);
    assert_eq!(report.summary.images_total, 2);
    assert_eq!(report.summary.images_analyzed, 1);
    assert_eq!(report.summary.images_failed, 0);
}

#[test]
fn test_run_app_exit_codes() {
    let dir = tempdir().unwrap();
    save(dir.path(), "a.png", &gray(32, 32, 90));
    save(dir.path(), "b.png", &gray(32, 32, 90));
    let path = dir.path().to_string_lossy().into_owned();

    let cli = Cli::try_parse_from(["photosift", "-q", "analyze", &path, "--output", "json"]).unwrap();
    assert_eq!(photosift::run_app(cli).unwrap(), ExitCode::Success);

    let lonely = tempdir().unwrap();
    save(lonely.path(), "only.png", &gray(32, 32, 90));
    let path = lonely.path().to_string_lossy().into_owned();
    let cli = Cli::try_parse_from(["photosift", "-q", "analyze", &path]).unwrap();
    assert_eq!(photosift::run_app(cli).unwrap(), ExitCode::NoDuplicates);
}

#[test]
fn test_run_app_errors() {
    let empty = tempdir().unwrap();
    let path = empty.path().to_string_lossy().into_owned();
    let cli = Cli::try_parse_from(["photosift", "-q", "analyze", &path]).unwrap();
    let err = photosift::run_app(cli).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AnalysisError>(),
        Some(AnalysisError::NoImages)
    ));

    let missing = empty.path().join("missing");
    let cli = Cli::try_parse_from(["photosift", "-q", "analyze", missing.to_str().unwrap()]).unwrap();
    let err = photosift::run_app(cli).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AnalysisError>(),
        Some(AnalysisError::PathNotFound(_))
    ));
}

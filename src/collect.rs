//! Turning command-line paths into image descriptors.
//!
//! Files are taken as given if their extension is supported. Directories
//! are walked with jwalk in name order, skipping hidden entries below the
//! given root. The result is deduplicated by path, keeping first-seen order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use jwalk::WalkDir;

use crate::cancel::CancelFlag;
use crate::error::AnalysisError;
use crate::source::{is_supported_image, ImageDescriptor};

/// Options for [`collect_images`].
#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Descend into subdirectories
    pub recursive: bool,
    /// Stops the walk early when raised
    pub cancel: Option<CancelFlag>,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            cancel: None,
        }
    }
}

impl CollectOptions {
    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }
}

/// Collect supported image files under `paths`.
///
/// # Errors
///
/// [`AnalysisError::PathNotFound`] for a missing path and
/// [`AnalysisError::Interrupted`] if cancelled during the walk.
pub fn collect_images(
    paths: &[PathBuf],
    options: &CollectOptions,
) -> Result<Vec<ImageDescriptor>, AnalysisError> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut files: Vec<PathBuf> = Vec::new();

    for root in paths {
        if !root.exists() {
            return Err(AnalysisError::PathNotFound(root.clone()));
        }
        if root.is_file() {
            if is_supported_image(root) && seen.insert(root.clone()) {
                files.push(root.clone());
            } else {
                log::debug!("Ignoring unsupported file: {}", root.display());
            }
            continue;
        }

        for path in walk_dir(root, options.recursive) {
            if options.is_cancelled() {
                log::debug!("Collection interrupted");
                return Err(AnalysisError::Interrupted);
            }
            if seen.insert(path.clone()) {
                files.push(path);
            }
        }
    }

    log::info!("Collected {} image files", files.len());
    Ok(files.into_iter().map(ImageDescriptor::from_path).collect())
}

fn walk_dir(root: &Path, recursive: bool) -> impl Iterator<Item = PathBuf> {
    let mut walk = WalkDir::new(root)
        .skip_hidden(false)
        .process_read_dir(|_depth, _path, _state, children| {
            children.retain(|child| {
                child
                    .as_ref()
                    .map(|e| !e.file_name().to_string_lossy().starts_with('.'))
                    .unwrap_or(true)
            });
            children.sort_by(|a, b| match (a, b) {
                (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                (Err(_), Err(_)) => std::cmp::Ordering::Equal,
            });
        });
    if !recursive {
        walk = walk.max_depth(1);
    }

    walk.into_iter().filter_map(|entry| match entry {
        Ok(entry) if entry.file_type().is_file() => {
            let path = entry.path();
            if is_supported_image(&path) {
                Some(path)
            } else {
                log::trace!("Skipping non-image: {}", path.display());
                None
            }
        }
        Ok(_) => None,
        Err(e) => {
            log::warn!("Walk error: {}", e);
            None
        }
    })
}

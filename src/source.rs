//! Image descriptors: the inputs handed to the analysis pipeline.
//!
//! The pipeline never walks directories or opens files on its own initiative.
//! Callers hand it values implementing [`ImageSource`], each exposing a stable
//! id, a filename for diagnostics, an optional creation timestamp, and a way to
//! obtain the encoded bytes on demand.
//!
//! [`ImageDescriptor`] is the stock implementation, backed either by an
//! in-memory buffer or by a file path that is read lazily by a worker.
//!
//! # Example
//!
//! ```
//! use photosift::source::{ImageDescriptor, ImageSource};
//!
//! let desc = ImageDescriptor::from_bytes("img-1", "beach.png", vec![1, 2, 3])
//!     .with_created_at("2024-07-01T09:30:00Z");
//!
//! assert_eq!(desc.id().as_str(), "img-1");
//! assert_eq!(desc.created_at(), Some("2024-07-01T09:30:00Z"));
//! assert_eq!(desc.read_bytes().unwrap().as_ref(), &[1, 2, 3]);
//! ```

use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File extensions the analyzer can decode.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "bmp", "gif", "tif", "tiff",
];

/// Opaque, stable identifier of one image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(String);

impl ImageId {
    /// Create an id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ImageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Anything the pipeline can analyze.
///
/// `read_bytes` is called once per run, from a worker thread. In-memory
/// sources should hand out a borrowed slice rather than a copy.
pub trait ImageSource {
    /// Stable unique id.
    fn id(&self) -> &ImageId;

    /// Filename used in error messages.
    fn filename(&self) -> &str;

    /// Creation timestamp as an ISO-8601 string, if known.
    fn created_at(&self) -> Option<&str>;

    /// Obtain the encoded image bytes.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the buffer cannot be obtained.
    fn read_bytes(&self) -> io::Result<Cow<'_, [u8]>>;
}

/// Where the encoded bytes of a descriptor live.
#[derive(Debug, Clone)]
enum ImageBuffer {
    /// Bytes already in memory.
    Memory(Arc<[u8]>),
    /// A file read on demand.
    File(PathBuf),
}

/// Immutable description of one image.
#[derive(Debug, Clone)]
pub struct ImageDescriptor {
    id: ImageId,
    filename: String,
    created_at: Option<String>,
    buffer: ImageBuffer,
}

impl ImageDescriptor {
    /// Create a descriptor over an in-memory buffer.
    #[must_use]
    pub fn from_bytes(
        id: impl Into<ImageId>,
        filename: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            created_at: None,
            buffer: ImageBuffer::Memory(bytes.into()),
        }
    }

    /// Create a descriptor for a file on disk.
    ///
    /// The path doubles as the id. The creation timestamp is taken from the
    /// filesystem (creation time, falling back to modification time); the
    /// file contents are not read until a worker asks for them.
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let created_at = fs::metadata(path)
            .ok()
            .and_then(|m| m.created().or_else(|_| m.modified()).ok())
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339());

        Self {
            id: ImageId::new(path.to_string_lossy()),
            filename,
            created_at,
            buffer: ImageBuffer::File(path.to_path_buf()),
        }
    }

    /// Set (or replace) the creation timestamp.
    #[must_use]
    pub fn with_created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = Some(created_at.into());
        self
    }

}

impl ImageSource for ImageDescriptor {
    fn id(&self) -> &ImageId {
        &self.id
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    fn created_at(&self) -> Option<&str> {
        self.created_at.as_deref()
    }

    fn read_bytes(&self) -> io::Result<Cow<'_, [u8]>> {
        match &self.buffer {
            ImageBuffer::Memory(bytes) => Ok(Cow::Borrowed(&bytes[..])),
            ImageBuffer::File(path) => fs::read(path).map(Cow::Owned),
        }
    }
}

/// Whether a path has a decodable image extension (case-insensitive).
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

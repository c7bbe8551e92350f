//! Similarity groups emitted by the clustering pass.

use serde::{Deserialize, Serialize};

use crate::source::ImageId;

/// A set of two or more near-duplicate images.
///
/// `similarity` is the weakest link observed while building the group, so
/// it is a lower bound on how alike the members are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityGroup {
    /// Group id, `group_<n>` in output order
    pub id: String,
    /// Member ids in input order, without repeats
    pub members: Vec<ImageId>,
    /// Minimum similarity among the links that built the group
    pub similarity: f64,
}

impl SimilarityGroup {
    /// Create a group.
    #[must_use]
    pub fn new(id: impl Into<String>, members: Vec<ImageId>, similarity: f64) -> Self {
        Self {
            id: id.into(),
            members,
            similarity,
        }
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether `id` belongs to this group.
    #[must_use]
    pub fn contains(&self, id: &ImageId) -> bool {
        self.members.contains(id)
    }

    /// Similarity as a rounded percentage.
    #[must_use]
    pub fn similarity_percent(&self) -> u8 {
        (self.similarity.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

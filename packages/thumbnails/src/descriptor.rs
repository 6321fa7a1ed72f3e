use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted record of a generated thumbnail.
///
/// At most one descriptor exists per `(source_id, size)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailDescriptor {
    pub source_id: String,
    pub size: String,
    /// Blob store path of the thumbnail bytes.
    pub path: String,
    pub created_at: DateTime<Utc>,
}

impl ThumbnailDescriptor {
    pub fn new(
        source_id: impl Into<String>,
        size: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            size: size.into(),
            path: path.into(),
            created_at: Utc::now(),
        }
    }
}

/// The original asset thumbnails are derived from, identified by its blob path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceImage {
    name: String,
}

impl SourceImage {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// An empty name means no upload is present.
    pub fn is_present(&self) -> bool {
        !self.name.is_empty()
    }
}

impl From<&str> for SourceImage {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for SourceImage {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

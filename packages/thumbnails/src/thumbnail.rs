//! Resolved thumbnail handles handed back to callers.

use std::fmt;
use std::sync::Arc;

use storage::BlobStore;

use crate::descriptor::ThumbnailDescriptor;
use crate::error::ThumbnailError;

/// A thumbnail backed by a persisted descriptor.
///
/// Rebuilt from the descriptor on each resolution; never persisted itself.
#[derive(Clone)]
pub struct StoredThumbnail {
    descriptor: ThumbnailDescriptor,
    storage: Arc<dyn BlobStore>,
}

impl StoredThumbnail {
    pub fn new(descriptor: ThumbnailDescriptor, storage: Arc<dyn BlobStore>) -> Self {
        Self {
            descriptor,
            storage,
        }
    }

    pub fn descriptor(&self) -> &ThumbnailDescriptor {
        &self.descriptor
    }

    pub fn path(&self) -> &str {
        &self.descriptor.path
    }

    pub fn url(&self) -> String {
        self.storage.url(&self.descriptor.path)
    }

    pub async fn read(&self) -> Result<Vec<u8>, ThumbnailError> {
        Ok(self.storage.read(&self.descriptor.path).await?)
    }

    pub async fn byte_size(&self) -> Result<u64, ThumbnailError> {
        Ok(self.storage.size(&self.descriptor.path).await?)
    }
}

impl PartialEq for StoredThumbnail {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor.path == other.descriptor.path
    }
}

impl fmt::Debug for StoredThumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredThumbnail")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Static placeholder served when no source image exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackImage {
    size: String,
    url: String,
}

impl FallbackImage {
    pub fn new(size: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            size: size.into(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Why a handle carries no descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    /// No source image is bound to the manager.
    NoSource,
    /// The source exists but this size has not been generated.
    NotGenerated { source_id: String },
}

/// Result of resolving a size on a manager.
#[derive(Debug, Clone, PartialEq)]
pub enum Thumbnail {
    Stored(StoredThumbnail),
    Fallback(FallbackImage),
    /// Empty handle. Accessing anything that needs backend data fails.
    Empty { size: String, missing: Missing },
}

impl Thumbnail {
    pub(crate) fn no_source(size: &str) -> Self {
        Self::Empty {
            size: size.to_string(),
            missing: Missing::NoSource,
        }
    }

    pub(crate) fn not_generated(source_id: &str, size: &str) -> Self {
        Self::Empty {
            size: size.to_string(),
            missing: Missing::NotGenerated {
                source_id: source_id.to_string(),
            },
        }
    }

    pub fn size(&self) -> &str {
        match self {
            Self::Stored(stored) => &stored.descriptor.size,
            Self::Fallback(fallback) => &fallback.size,
            Self::Empty { size, .. } => size,
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored(_))
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Empty { .. })
    }

    pub fn descriptor(&self) -> Option<&ThumbnailDescriptor> {
        match self {
            Self::Stored(stored) => Some(stored.descriptor()),
            _ => None,
        }
    }

    /// Blob path of the thumbnail. Fallback images have no path.
    pub fn path(&self) -> Result<&str, ThumbnailError> {
        match self {
            Self::Stored(stored) => Ok(stored.path()),
            _ => Err(self.unavailable()),
        }
    }

    pub fn url(&self) -> Result<String, ThumbnailError> {
        match self {
            Self::Stored(stored) => Ok(stored.url()),
            Self::Fallback(fallback) => Ok(fallback.url.clone()),
            Self::Empty { .. } => Err(self.unavailable()),
        }
    }

    pub async fn read(&self) -> Result<Vec<u8>, ThumbnailError> {
        match self {
            Self::Stored(stored) => stored.read().await,
            _ => Err(self.unavailable()),
        }
    }

    pub async fn byte_size(&self) -> Result<u64, ThumbnailError> {
        match self {
            Self::Stored(stored) => stored.byte_size().await,
            _ => Err(self.unavailable()),
        }
    }

    /// Error for accessing blob data on a handle that has none.
    fn unavailable(&self) -> ThumbnailError {
        match self {
            Self::Empty {
                size,
                missing: Missing::NotGenerated { source_id },
            } => ThumbnailError::NotFound {
                source_id: source_id.clone(),
                size: size.clone(),
            },
            // Fallbacks only exist when no source is bound.
            _ => ThumbnailError::NoSource {
                size: self.size().to_string(),
            },
        }
    }
}

impl From<StoredThumbnail> for Thumbnail {
    fn from(stored: StoredThumbnail) -> Self {
        Self::Stored(stored)
    }
}

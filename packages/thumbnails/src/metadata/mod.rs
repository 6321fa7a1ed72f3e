//! Metadata backends mapping `(source_id, size)` to a [`ThumbnailDescriptor`].

use std::collections::HashMap;

use async_trait::async_trait;

use crate::descriptor::ThumbnailDescriptor;
use crate::error::MetadataError;

#[cfg(feature = "database")]
pub mod database;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryMetadataStore;

/// Persistence of thumbnail descriptors.
///
/// Implementations must be safe to share between many managers. `add` is an
/// upsert: the last write for a `(source_id, size)` pair wins.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Whether [`get_many`](Self::get_many) is a genuine single round trip.
    fn supports_batch(&self) -> bool {
        false
    }

    async fn get_one(
        &self,
        source_id: &str,
        size: &str,
    ) -> Result<Option<ThumbnailDescriptor>, MetadataError>;

    async fn get_all(&self, source_id: &str) -> Result<Vec<ThumbnailDescriptor>, MetadataError>;

    /// Fetch descriptors for many sources at once, restricted to `sizes` when given.
    ///
    /// Sources without descriptors may be missing from the result. Backends
    /// without a bulk query keep the default, which refuses instead of
    /// issuing one query per source.
    async fn get_many(
        &self,
        source_ids: &[String],
        sizes: Option<&[String]>,
    ) -> Result<HashMap<String, Vec<ThumbnailDescriptor>>, MetadataError> {
        let _ = (source_ids, sizes);
        Err(MetadataError::BatchUnsupported {
            backend: self.name(),
        })
    }

    async fn add(&self, descriptor: &ThumbnailDescriptor) -> Result<(), MetadataError>;

    /// Register a freshly stored source image.
    async fn add_source(&self, source_id: &str) -> Result<(), MetadataError>;

    /// Remove the descriptor for a pair. Returns `false` if there was none.
    async fn remove(&self, source_id: &str, size: &str) -> Result<bool, MetadataError>;
}

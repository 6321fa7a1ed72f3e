//! In-memory blob store for tests and ephemeral thumbnails.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::io::AsyncReadExt;

use super::error::StorageError;
use super::path::{BlobPath, alternative_name};
use super::traits::{BlobStore, BoxReader};

/// [`BlobStore`] keeping every blob in a `DashMap`.
///
/// Clones share the same underlying map.
#[derive(Clone, Debug, Default)]
pub struct MemoryBlobStore {
    base_url: String,
    blobs: Arc<DashMap<String, Arc<Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            blobs: Arc::new(DashMap::new()),
        }
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Sorted list of stored paths.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.blobs.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn save(&self, path: &str, data: &[u8]) -> Result<String, StorageError> {
        let mut candidate = BlobPath::parse(path)?;
        let data = Arc::new(data.to_vec());
        loop {
            match self.blobs.entry(candidate.as_str().to_owned()) {
                Entry::Vacant(slot) => {
                    slot.insert(data);
                    return Ok(candidate.as_str().to_owned());
                }
                Entry::Occupied(_) => candidate = alternative_name(&candidate),
            }
        }
    }

    async fn save_stream(&self, path: &str, mut reader: BoxReader) -> Result<String, StorageError> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        self.save(path, &buf).await
    }

    async fn read_stream(&self, path: &str) -> Result<BoxReader, StorageError> {
        let blob = BlobPath::parse(path)?;
        match self.blobs.get(blob.as_str()) {
            Some(data) => Ok(Box::new(Cursor::new(data.value().as_ref().clone()))),
            None => Err(StorageError::NotFound(blob.to_string())),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let blob = BlobPath::parse(path)?;
        Ok(self.blobs.contains_key(blob.as_str()))
    }

    async fn delete(&self, path: &str) -> Result<bool, StorageError> {
        let blob = BlobPath::parse(path)?;
        Ok(self.blobs.remove(blob.as_str()).is_some())
    }

    async fn size(&self, path: &str) -> Result<u64, StorageError> {
        let blob = BlobPath::parse(path)?;
        self.blobs
            .get(blob.as_str())
            .map(|data| data.len() as u64)
            .ok_or_else(|| StorageError::NotFound(blob.to_string()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

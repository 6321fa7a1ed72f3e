use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use super::MetadataStore;
use crate::descriptor::ThumbnailDescriptor;
use crate::error::MetadataError;

#[derive(Debug, Default)]
struct Inner {
    sources: HashSet<String>,
    thumbnails: HashMap<String, BTreeMap<String, ThumbnailDescriptor>>,
}

/// Process-local key/value metadata store.
///
/// Keeps one map of `size -> descriptor` per source, so `get_many` is a
/// single read-lock acquisition.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    inner: RwLock<Inner>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        // Every write is a single insert or remove, so poisoning cannot
        // leave the maps inconsistent.
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether `add_source` was called for `source_id`.
    pub fn has_source(&self, source_id: &str) -> bool {
        self.read().sources.contains(source_id)
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn supports_batch(&self) -> bool {
        true
    }

    async fn get_one(
        &self,
        source_id: &str,
        size: &str,
    ) -> Result<Option<ThumbnailDescriptor>, MetadataError> {
        Ok(self
            .read()
            .thumbnails
            .get(source_id)
            .and_then(|sizes| sizes.get(size))
            .cloned())
    }

    async fn get_all(&self, source_id: &str) -> Result<Vec<ThumbnailDescriptor>, MetadataError> {
        Ok(self
            .read()
            .thumbnails
            .get(source_id)
            .map(|sizes| sizes.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_many(
        &self,
        source_ids: &[String],
        sizes: Option<&[String]>,
    ) -> Result<HashMap<String, Vec<ThumbnailDescriptor>>, MetadataError> {
        let inner = self.read();
        let mut result = HashMap::with_capacity(source_ids.len());
        for source_id in source_ids {
            let Some(stored) = inner.thumbnails.get(source_id) else {
                continue;
            };
            let descriptors: Vec<_> = match sizes {
                Some(sizes) => sizes.iter().filter_map(|s| stored.get(s)).cloned().collect(),
                None => stored.values().cloned().collect(),
            };
            result.insert(source_id.clone(), descriptors);
        }
        Ok(result)
    }

    async fn add(&self, descriptor: &ThumbnailDescriptor) -> Result<(), MetadataError> {
        self.write()
            .thumbnails
            .entry(descriptor.source_id.clone())
            .or_default()
            .insert(descriptor.size.clone(), descriptor.clone());
        Ok(())
    }

    async fn add_source(&self, source_id: &str) -> Result<(), MetadataError> {
        self.write().sources.insert(source_id.to_string());
        Ok(())
    }

    async fn remove(&self, source_id: &str, size: &str) -> Result<bool, MetadataError> {
        let mut inner = self.write();
        let Some(sizes) = inner.thumbnails.get_mut(source_id) else {
            return Ok(false);
        };
        let removed = sizes.remove(size).is_some();
        if sizes.is_empty() {
            inner.thumbnails.remove(source_id);
        }
        Ok(removed)
    }
}

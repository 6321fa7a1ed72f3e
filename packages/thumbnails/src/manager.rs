use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use storage::BlobStore;
use tracing::{debug, trace};

use crate::cancel::Cancellation;
use crate::descriptor::{SourceImage, ThumbnailDescriptor};
use crate::error::ThumbnailError;
use crate::generator::Generator;
use crate::locks::{GenerationGuard, GenerationLocks};
use crate::metadata::MetadataStore;
use crate::registry::{SizeRegistry, SizeSpec};
use crate::thumbnail::{FallbackImage, StoredThumbnail, Thumbnail};

#[derive(Debug, Clone)]
enum CacheEntry {
    Stored(StoredThumbnail),
    /// Authoritative miss from a listing or a scoped prefetch.
    Absent,
}

/// Cache state of one size, as reported by [`ThumbnailManager::cached_sizes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Stored,
    Absent,
}

/// Per-source facade resolving, generating and caching thumbnails.
///
/// Resolved handles are cached per size for the lifetime of the manager. The
/// cache is `None` until the first lookup, which distinguishes "never
/// queried" from "queried, nothing found".
pub struct ThumbnailManager {
    source: Option<SourceImage>,
    registry: Arc<SizeRegistry>,
    metadata: Arc<dyn MetadataStore>,
    storage: Arc<dyn BlobStore>,
    generator: Arc<Generator>,
    locks: Option<GenerationLocks>,
    cancellation: Cancellation,
    cache: Mutex<Option<HashMap<String, CacheEntry>>>,
}

impl ThumbnailManager {
    pub fn new(
        source: Option<SourceImage>,
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn BlobStore>,
        generator: Arc<Generator>,
    ) -> Self {
        Self {
            source: source.filter(SourceImage::is_present),
            registry: Arc::clone(generator.registry()),
            metadata,
            storage,
            generator,
            locks: None,
            cancellation: Cancellation::none(),
            cache: Mutex::new(None),
        }
    }

    /// Serialize generation per `(source, size)` through `locks`.
    pub fn with_locks(mut self, locks: GenerationLocks) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Rebind to another metadata backend. Clears the cache.
    pub fn with_metadata_store(mut self, metadata: Arc<dyn MetadataStore>) -> Self {
        self.metadata = metadata;
        self.reset_cache();
        self
    }

    /// Race every backend call against `cancellation`.
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn source(&self) -> Option<&SourceImage> {
        self.source.as_ref()
    }

    pub fn registry(&self) -> &Arc<SizeRegistry> {
        &self.registry
    }

    pub fn metadata_store(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    /// Resolve `size`, generating it if it does not exist yet.
    pub async fn get(&self, size: &str) -> Result<Thumbnail, ThumbnailError> {
        self.resolve(size, true).await
    }

    /// Resolve `size` without generating. A missing thumbnail is an empty handle.
    pub async fn find(&self, size: &str) -> Result<Thumbnail, ThumbnailError> {
        self.resolve(size, false).await
    }

    /// Named access, equivalent to [`get`](Self::get).
    pub async fn size(&self, name: &str) -> Result<Thumbnail, ThumbnailError> {
        self.get(name).await
    }

    /// Every persisted thumbnail of the source, keyed by size.
    ///
    /// Never generates. Registry sizes without a descriptor are remembered
    /// as absent unless the cache already holds them.
    pub async fn all(&self) -> Result<BTreeMap<String, Thumbnail>, ThumbnailError> {
        let Some(source_id) = self.source_id() else {
            return Ok(BTreeMap::new());
        };

        let descriptors = self
            .cancellation
            .guard(self.metadata.get_all(source_id))
            .await?;
        debug!(source_id, found = descriptors.len(), "Listed thumbnails");

        let stored: BTreeMap<String, StoredThumbnail> = descriptors
            .into_iter()
            .map(|descriptor| (descriptor.size.clone(), self.wrap(descriptor)))
            .collect();

        let mut cache = self.lock_cache();
        let cache = cache.get_or_insert_with(HashMap::new);
        for name in self.registry.names() {
            if !stored.contains_key(name) {
                cache
                    .entry(name.to_string())
                    .or_insert(CacheEntry::Absent);
            }
        }
        for (size, thumbnail) in &stored {
            cache.insert(size.clone(), CacheEntry::Stored(thumbnail.clone()));
        }

        Ok(stored
            .into_iter()
            .map(|(size, thumbnail)| (size, Thumbnail::Stored(thumbnail)))
            .collect())
    }

    /// Generate `size` again and replace the cached handle.
    pub async fn create(&self, size: &str) -> Result<Thumbnail, ThumbnailError> {
        self.registry.get(size)?;
        let source_id = self.source_id().ok_or_else(|| ThumbnailError::NoSource {
            size: size.to_string(),
        })?;

        let _guard = self.lock_pair(source_id, size).await?;
        self.generate(source_id, size).await
    }

    /// Remove the blob and descriptor of `size`.
    ///
    /// Returns `false` when there was nothing to delete.
    pub async fn delete(&self, size: &str) -> Result<bool, ThumbnailError> {
        self.registry.get(size)?;
        let Some(source_id) = self.source_id() else {
            return Ok(false);
        };

        let _guard = self.lock_pair(source_id, size).await?;
        let deleted = self
            .cancellation
            .guard(delete_pair(
                self.metadata.as_ref(),
                self.storage.as_ref(),
                source_id,
                size,
            ))
            .await?;

        if let Some(cache) = self.lock_cache().as_mut() {
            cache.remove(size);
        }
        Ok(deleted)
    }

    /// Forget every cached handle.
    pub fn reset_cache(&self) {
        *self.lock_cache() = None;
    }

    /// Snapshot of the cache. `None` if it was never populated.
    pub fn cached_sizes(&self) -> Option<BTreeMap<String, CacheState>> {
        self.lock_cache().as_ref().map(|cache| {
            cache
                .iter()
                .map(|(size, entry)| {
                    let state = match entry {
                        CacheEntry::Stored(_) => CacheState::Stored,
                        CacheEntry::Absent => CacheState::Absent,
                    };
                    (size.clone(), state)
                })
                .collect()
        })
    }

    pub(crate) fn source_id(&self) -> Option<&str> {
        self.source.as_ref().map(SourceImage::name)
    }

    /// Merge prefetched descriptors for the sizes in `scope`.
    ///
    /// In-scope sizes without a descriptor become absent unless already
    /// cached. Sizes outside the scope are left alone.
    pub(crate) fn merge_prefetched(&self, descriptors: Vec<ThumbnailDescriptor>, scope: &[String]) {
        let mut cache = self.lock_cache();
        let cache = cache.get_or_insert_with(HashMap::new);
        for size in scope {
            cache.entry(size.clone()).or_insert(CacheEntry::Absent);
        }
        for descriptor in descriptors {
            if scope.contains(&descriptor.size) {
                let size = descriptor.size.clone();
                cache.insert(size, CacheEntry::Stored(self.wrap(descriptor)));
            }
        }
    }

    async fn resolve(&self, size: &str, create: bool) -> Result<Thumbnail, ThumbnailError> {
        let spec = self.registry.get(size)?;
        let Some(source_id) = self.source_id() else {
            return Ok(unbound(spec));
        };

        let cached = self.cached(size);
        match &cached {
            Some(CacheEntry::Stored(thumbnail)) => {
                trace!(source_id, size, "Thumbnail cache hit");
                return Ok(Thumbnail::Stored(thumbnail.clone()));
            }
            Some(CacheEntry::Absent) if !create => {
                return Ok(Thumbnail::not_generated(source_id, size));
            }
            _ => {}
        }

        let guard = if create {
            self.lock_pair(source_id, size).await?
        } else {
            None
        };

        // A cached miss is trusted unless another lock holder may have generated since.
        if cached.is_none() || guard.is_some() {
            let found = self
                .cancellation
                .guard(self.metadata.get_one(source_id, size))
                .await?;
            debug!(source_id, size, found = found.is_some(), "Metadata lookup");

            if let Some(descriptor) = found {
                let thumbnail = self.wrap(descriptor);
                self.store(size, CacheEntry::Stored(thumbnail.clone()));
                return Ok(Thumbnail::Stored(thumbnail));
            }
        }

        if !create {
            self.store(size, CacheEntry::Absent);
            return Ok(Thumbnail::not_generated(source_id, size));
        }
        self.generate(source_id, size).await
    }

    async fn generate(&self, source_id: &str, size: &str) -> Result<Thumbnail, ThumbnailError> {
        let descriptor = self
            .cancellation
            .guard(self.generator.create(
                source_id,
                size,
                self.metadata.as_ref(),
                self.storage.as_ref(),
            ))
            .await?;

        let thumbnail = self.wrap(descriptor);
        self.store(size, CacheEntry::Stored(thumbnail.clone()));
        Ok(Thumbnail::Stored(thumbnail))
    }

    async fn lock_pair(
        &self,
        source_id: &str,
        size: &str,
    ) -> Result<Option<GenerationGuard>, ThumbnailError> {
        let Some(locks) = &self.locks else {
            return Ok(None);
        };
        let guard = self
            .cancellation
            .guard(async { Ok::<_, ThumbnailError>(locks.acquire(source_id, size).await) })
            .await?;
        Ok(Some(guard))
    }

    fn wrap(&self, descriptor: ThumbnailDescriptor) -> StoredThumbnail {
        StoredThumbnail::new(descriptor, Arc::clone(&self.storage))
    }

    fn cached(&self, size: &str) -> Option<CacheEntry> {
        self.lock_cache()
            .as_ref()
            .and_then(|cache| cache.get(size).cloned())
    }

    fn store(&self, size: &str, entry: CacheEntry) {
        self.lock_cache()
            .get_or_insert_with(HashMap::new)
            .insert(size.to_string(), entry);
    }

    fn lock_cache(&self) -> MutexGuard<'_, Option<HashMap<String, CacheEntry>>> {
        // Never held across an await; a poisoned map is still consistent.
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for ThumbnailManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThumbnailManager")
            .field("source", &self.source)
            .field("metadata", &self.metadata.name())
            .field("locks", &self.locks.is_some())
            .finish_non_exhaustive()
    }
}

fn unbound(spec: &SizeSpec) -> Thumbnail {
    match &spec.fallback_url {
        Some(url) => Thumbnail::Fallback(FallbackImage::new(&spec.name, url)),
        None => Thumbnail::no_source(&spec.name),
    }
}

/// Delete the blob and descriptor of a pair, if any.
pub(crate) async fn delete_pair(
    metadata: &dyn MetadataStore,
    storage: &dyn BlobStore,
    source_id: &str,
    size: &str,
) -> Result<bool, ThumbnailError> {
    let Some(descriptor) = metadata.get_one(source_id, size).await? else {
        debug!(source_id, size, "Nothing to delete");
        return Ok(false);
    };

    let blob_removed = storage.delete(&descriptor.path).await?;
    let row_removed = metadata.remove(source_id, size).await?;
    debug!(
        source_id,
        size,
        path = %descriptor.path,
        blob_removed,
        "Thumbnail deleted"
    );
    Ok(blob_removed || row_removed)
}

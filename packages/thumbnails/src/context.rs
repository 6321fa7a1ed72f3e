use std::sync::Arc;
use std::time::Duration;

use storage::BlobStore;
use storage::filesystem::FilesystemBlobStore;
use tracing::info;

use crate::cancel::Cancellation;
use crate::config::{MetadataBackend, ThumbnailsConfig};
use crate::descriptor::SourceImage;
use crate::error::ThumbnailError;
use crate::generator::Generator;
use crate::locks::GenerationLocks;
use crate::manager::{ThumbnailManager, delete_pair};
use crate::metadata::{MemoryMetadataStore, MetadataStore};
use crate::processor::Processor;
use crate::registry::SizeRegistry;

/// Shared collaborators every manager is built from.
pub struct Thumbnails {
    registry: Arc<SizeRegistry>,
    metadata: Arc<dyn MetadataStore>,
    storage: Arc<dyn BlobStore>,
    generator: Arc<Generator>,
    locks: Option<GenerationLocks>,
    cancellation: Cancellation,
}

impl Thumbnails {
    pub fn new(
        registry: Arc<SizeRegistry>,
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn BlobStore>,
        processor: Arc<dyn Processor>,
        thumbnail_dir: impl Into<String>,
    ) -> Self {
        let generator = Arc::new(Generator::new(
            Arc::clone(&registry),
            processor,
            thumbnail_dir,
        ));
        Self {
            registry,
            metadata,
            storage,
            generator,
            locks: None,
            cancellation: Cancellation::none(),
        }
    }

    /// Build everything from configuration: filesystem blob store, the
    /// configured metadata backend and the size registry.
    pub async fn from_config(
        config: &ThumbnailsConfig,
        processor: Arc<dyn Processor>,
    ) -> Result<Self, ThumbnailError> {
        let registry = Arc::new(config.registry()?);
        let storage = FilesystemBlobStore::new(
            config.storage.base_path.clone(),
            config.storage.base_url.clone(),
            config.storage.max_size,
        )
        .await?;
        let metadata = connect_metadata(config).await?;

        info!(
            sizes = registry.len(),
            backend = metadata.name(),
            base_path = %config.storage.base_path.display(),
            "Thumbnails initialized"
        );

        let mut thumbnails = Self::new(
            registry,
            metadata,
            Arc::new(storage),
            processor,
            config.storage.thumbnail_dir.clone(),
        );
        if config.generation.lock {
            thumbnails = thumbnails.with_locks();
        }
        if let Some(ms) = config.generation.timeout_ms {
            thumbnails = thumbnails
                .with_cancellation(Cancellation::none().with_timeout(Duration::from_millis(ms)));
        }
        Ok(thumbnails)
    }

    /// Serialize generation per `(source, size)` across managers built from here.
    pub fn with_locks(mut self) -> Self {
        self.locks = Some(GenerationLocks::new());
        self
    }

    /// Applied to every manager built afterwards and to `exists`/`delete`.
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Manager bound to `source`. An empty name yields an unbound manager.
    pub fn manager(&self, source: impl Into<SourceImage>) -> ThumbnailManager {
        let manager = ThumbnailManager::new(
            Some(source.into()),
            Arc::clone(&self.metadata),
            Arc::clone(&self.storage),
            Arc::clone(&self.generator),
        )
        .with_cancellation(self.cancellation.clone());
        match &self.locks {
            Some(locks) => manager.with_locks(locks.clone()),
            None => manager,
        }
    }

    /// Register a freshly saved source image.
    pub async fn add_source(&self, source_id: &str) -> Result<(), ThumbnailError> {
        self.cancellation
            .guard(self.metadata.add_source(source_id))
            .await
    }

    pub fn registry(&self) -> &Arc<SizeRegistry> {
        &self.registry
    }

    pub fn metadata_store(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    pub fn storage(&self) -> &Arc<dyn BlobStore> {
        &self.storage
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }
}

async fn connect_metadata(
    config: &ThumbnailsConfig,
) -> Result<Arc<dyn MetadataStore>, ThumbnailError> {
    match config.metadata.backend {
        MetadataBackend::Memory => Ok(Arc::new(MemoryMetadataStore::new())),
        #[cfg(feature = "database")]
        MetadataBackend::Database => {
            let store = crate::metadata::database::DatabaseMetadataStore::connect(
                &config.metadata.url,
                config.metadata.max_connections,
            )
            .await?;
            store.sync_schema().await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "redis")]
        MetadataBackend::Redis => {
            let store = crate::metadata::redis::RedisMetadataStore::connect(
                &config.metadata.url,
                config.metadata.key_prefix.clone(),
            )
            .await?;
            Ok(Arc::new(store))
        }
        #[allow(unreachable_patterns)]
        other => Err(ThumbnailError::Config(format!(
            "metadata backend {other:?} is not compiled in"
        ))),
    }
}

/// Whether the thumbnail of `size` exists for `source_id`, bypassing every
/// manager cache. `None` means the default size.
pub async fn exists(
    thumbnails: &Thumbnails,
    source_id: &str,
    size: Option<&str>,
) -> Result<bool, ThumbnailError> {
    let spec = thumbnails.registry.resolve(size)?;
    let cancellation = &thumbnails.cancellation;

    let Some(descriptor) = cancellation
        .guard(thumbnails.metadata.get_one(source_id, &spec.name))
        .await?
    else {
        return Ok(false);
    };
    cancellation
        .guard(thumbnails.storage.exists(&descriptor.path))
        .await
}

/// Delete the thumbnail of `size` for `source_id`, bypassing every manager
/// cache. `None` means the default size. Returns `false` if nothing existed.
pub async fn delete(
    thumbnails: &Thumbnails,
    source_id: &str,
    size: Option<&str>,
) -> Result<bool, ThumbnailError> {
    let spec = thumbnails.registry.resolve(size)?;
    thumbnails
        .cancellation
        .guard(delete_pair(
            thumbnails.metadata.as_ref(),
            thumbnails.storage.as_ref(),
            source_id,
            &spec.name,
        ))
        .await
}

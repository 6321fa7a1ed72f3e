use std::sync::Arc;

use storage::{BlobPath, BlobStore};
use tracing::{debug, info, warn};

use crate::descriptor::ThumbnailDescriptor;
use crate::error::{ProcessError, ThumbnailError};
use crate::metadata::MetadataStore;
use crate::processor::Processor;
use crate::registry::{SizeRegistry, SizeSpec};

/// Produces thumbnail blobs and records their descriptors.
///
/// Thumbnails are written to
/// `{base_dir}/{source_dir}/{stem}_{size}_{random}.{ext}`, so concurrent
/// creates of one pair never write to the same blob.
pub struct Generator {
    registry: Arc<SizeRegistry>,
    processor: Arc<dyn Processor>,
    base_dir: String,
}

impl Generator {
    pub fn new(
        registry: Arc<SizeRegistry>,
        processor: Arc<dyn Processor>,
        base_dir: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            processor,
            base_dir: base_dir.into().trim_matches('/').to_string(),
        }
    }

    pub fn registry(&self) -> &Arc<SizeRegistry> {
        &self.registry
    }

    /// Generate `size` for `source_id` and persist it, replacing any earlier
    /// thumbnail of the pair.
    pub async fn create(
        &self,
        source_id: &str,
        size: &str,
        metadata: &dyn MetadataStore,
        storage: &dyn BlobStore,
    ) -> Result<ThumbnailDescriptor, ThumbnailError> {
        let spec = self.registry.get(size)?;
        let source = BlobPath::parse(source_id)?;
        let extension = output_extension(&source, spec)?;

        let previous = metadata.get_one(source_id, size).await?;
        let bytes = storage.read(source_id).await?;

        let processor = Arc::clone(&self.processor);
        let transform = spec.transform.clone();
        let ext = extension.clone();
        let data =
            tokio::task::spawn_blocking(move || processor.process(&bytes, &transform, &ext))
                .await
                .map_err(|e| ProcessError::Task(e.to_string()))??;

        let path = self.thumbnail_path(&source, size, &extension);
        let saved = storage.save(&path, &data).await?;
        let descriptor = ThumbnailDescriptor::new(source_id, size, saved);
        metadata.add(&descriptor).await?;

        info!(
            source_id,
            size,
            path = %descriptor.path,
            bytes = data.len(),
            "Thumbnail generated"
        );

        if let Some(previous) = previous {
            if previous.path != descriptor.path {
                match storage.delete(&previous.path).await {
                    Ok(removed) => {
                        debug!(path = %previous.path, removed, "Superseded thumbnail deleted");
                    }
                    Err(e) => {
                        warn!(
                            path = %previous.path,
                            error = %e,
                            "Failed to delete superseded thumbnail"
                        );
                    }
                }
            }
        }

        Ok(descriptor)
    }

    fn thumbnail_path(&self, source: &BlobPath, size: &str, extension: &str) -> String {
        let random = uuid::Uuid::new_v4().simple().to_string();
        let file = format!("{}_{size}_{}.{extension}", source.file_stem(), &random[..16]);

        [Some(self.base_dir.as_str()), source.parent(), Some(file.as_str())]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn output_extension(source: &BlobPath, spec: &SizeSpec) -> Result<String, ProcessError> {
    match &spec.transform.format {
        Some(format) => Ok(format.trim_start_matches('.').to_ascii_lowercase()),
        None => source.extension().ok_or_else(|| {
            ProcessError::UnsupportedFormat(format!("'{source}' has no extension"))
        }),
    }
}

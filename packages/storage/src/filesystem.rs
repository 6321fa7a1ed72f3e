use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use super::error::StorageError;
use super::path::{BlobPath, alternative_name};
use super::traits::{BlobStore, BoxReader};

const TEMP_DIR: &str = ".tmp";
const MAX_NAME_ATTEMPTS: usize = 16;

/// Filesystem-backed blob store.
///
/// Blobs live at `{base_path}/{path}`. Writes go to `{base_path}/.tmp` first
/// and are hard-linked into place, which fails instead of clobbering when the
/// target already exists.
pub struct FilesystemBlobStore {
    base_path: PathBuf,
    base_url: String,
    max_size: u64,
}

impl FilesystemBlobStore {
    /// Create a new filesystem blob store.
    pub async fn new(
        base_path: PathBuf,
        base_url: impl Into<String>,
        max_size: u64,
    ) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(TEMP_DIR)).await?;
        Ok(Self {
            base_path,
            base_url: base_url.into(),
            max_size,
        })
    }

    /// Validate `path` and map it to its location on disk.
    fn resolve(&self, path: &str) -> Result<(BlobPath, PathBuf), StorageError> {
        let blob = BlobPath::parse(path)?;
        if blob.as_str() == TEMP_DIR || blob.as_str().starts_with(".tmp/") {
            return Err(StorageError::InvalidPath(format!(
                "'{path}' is inside the reserved temp directory"
            )));
        }
        let disk = self.disk_path(&blob);
        Ok((blob, disk))
    }

    fn disk_path(&self, blob: &BlobPath) -> PathBuf {
        let mut disk = self.base_path.clone();
        disk.extend(blob.as_str().split('/'));
        disk
    }

    /// Path for a temporary file during writes.
    fn temp_path(&self) -> PathBuf {
        self.base_path
            .join(TEMP_DIR)
            .join(uuid::Uuid::new_v4().to_string())
    }

    /// Move a fully written temp file to `requested`, or to a free sibling
    /// name if `requested` is taken. The temp file is always removed.
    async fn commit(&self, temp_path: &Path, requested: BlobPath) -> Result<String, StorageError> {
        let mut candidate = requested;
        for _ in 0..MAX_NAME_ATTEMPTS {
            let target = self.disk_path(&candidate);
            if let Some(parent) = target.parent() {
                if let Err(e) = fs::create_dir_all(parent).await {
                    let _ = fs::remove_file(temp_path).await;
                    return Err(e.into());
                }
            }

            match fs::hard_link(temp_path, &target).await {
                Ok(()) => {
                    let _ = fs::remove_file(temp_path).await;
                    return Ok(candidate.as_str().to_owned());
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(path = %candidate, "Blob path taken, picking another name");
                    candidate = alternative_name(&candidate);
                }
                Err(e) => {
                    let _ = fs::remove_file(temp_path).await;
                    return Err(e.into());
                }
            }
        }

        let _ = fs::remove_file(temp_path).await;
        Err(StorageError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free name found after {MAX_NAME_ATTEMPTS} attempts"),
        )))
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn save(&self, path: &str, data: &[u8]) -> Result<String, StorageError> {
        let (blob, _) = self.resolve(path)?;
        if data.len() as u64 > self.max_size {
            return Err(StorageError::SizeLimitExceeded {
                actual: data.len() as u64,
                limit: self.max_size,
            });
        }

        let temp_path = self.temp_path();
        if let Err(e) = fs::write(&temp_path, data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        self.commit(&temp_path, blob).await
    }

    async fn save_stream(&self, path: &str, mut reader: BoxReader) -> Result<String, StorageError> {
        let (blob, _) = self.resolve(path)?;
        let temp_path = self.temp_path();
        let mut total_bytes: u64 = 0;

        let mut buf = vec![0u8; 64 * 1024]; // 64KB read buffer
        let mut temp_file = fs::File::create(&temp_path).await?;

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    drop(temp_file);
                    let _ = fs::remove_file(&temp_path).await;
                    return Err(e.into());
                }
            };
            if n == 0 {
                break;
            }

            total_bytes += n as u64;
            if total_bytes > self.max_size {
                drop(temp_file);
                let _ = fs::remove_file(&temp_path).await;
                return Err(StorageError::SizeLimitExceeded {
                    actual: total_bytes,
                    limit: self.max_size,
                });
            }

            temp_file.write_all(&buf[..n]).await?;
        }

        temp_file.flush().await?;
        drop(temp_file);

        self.commit(&temp_path, blob).await
    }

    async fn read_stream(&self, path: &str) -> Result<BoxReader, StorageError> {
        let (blob, disk) = self.resolve(path)?;
        match fs::File::open(&disk).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(blob.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let (_, disk) = self.resolve(path)?;
        Ok(fs::try_exists(&disk).await?)
    }

    async fn delete(&self, path: &str) -> Result<bool, StorageError> {
        let (_, disk) = self.resolve(path)?;
        match fs::remove_file(&disk).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn size(&self, path: &str) -> Result<u64, StorageError> {
        let (blob, disk) = self.resolve(path)?;
        match fs::metadata(&disk).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(blob.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

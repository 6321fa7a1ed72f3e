use std::io::Cursor;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::StorageError;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// Path-addressed blob storage.
///
/// Paths are relative, `/`-separated and validated with
/// [`BlobPath::parse`](super::BlobPath::parse). Namespacing (base directory,
/// per-field subdirectory) is the caller's concern.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes at `path` and return the path actually written.
    ///
    /// If `path` is already taken an alternative free name is chosen, so an
    /// unrelated existing blob is never overwritten.
    async fn save(&self, path: &str, data: &[u8]) -> Result<String, StorageError> {
        let reader: BoxReader = Box::new(Cursor::new(data.to_vec()));
        self.save_stream(path, reader).await
    }

    /// Store data from an async reader and return the path actually written.
    async fn save_stream(&self, path: &str, reader: BoxReader) -> Result<String, StorageError>;

    /// Retrieve all bytes stored at `path`.
    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let mut reader = self.read_stream(path).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Retrieve a blob as a streaming async reader.
    async fn read_stream(&self, path: &str) -> Result<BoxReader, StorageError>;

    /// Check whether a blob exists.
    async fn exists(&self, path: &str) -> Result<bool, StorageError>;

    /// Delete a blob.
    ///
    /// Returns `true` if the blob was deleted, `false` if it did not exist.
    async fn delete(&self, path: &str) -> Result<bool, StorageError>;

    /// Get the size of a blob in bytes.
    async fn size(&self, path: &str) -> Result<u64, StorageError>;

    /// Public URL under which the blob at `path` is served.
    fn url(&self, path: &str) -> String;
}

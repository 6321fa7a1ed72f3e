//! Path-addressed blob storage used to hold source images and their thumbnails.

mod error;
mod path;
mod traits;

pub mod filesystem;
pub mod memory;

pub use error::StorageError;
pub use path::{BlobPath, alternative_name};
pub use traits::{BlobStore, BoxReader};

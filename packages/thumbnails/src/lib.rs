//! Thumbnail lifecycle engine: on-demand generation, metadata-backed existence
//! tracking, per-source caching and batch prefetch.

pub mod cancel;
pub mod config;
pub mod context;
pub mod descriptor;
#[cfg(feature = "database")]
pub mod entity;
pub mod error;
pub mod fetch;
pub mod generator;
pub mod locks;
pub mod manager;
pub mod metadata;
pub mod processor;
pub mod registry;
pub mod thumbnail;

pub use cancel::Cancellation;
pub use config::ThumbnailsConfig;
pub use context::{Thumbnails, delete, exists};
pub use descriptor::{SourceImage, ThumbnailDescriptor};
pub use error::{MetadataError, ProcessError, ThumbnailError};
pub use fetch::{FetchSummary, fetch_thumbnails};
pub use generator::Generator;
pub use locks::GenerationLocks;
pub use manager::{CacheState, ThumbnailManager};
pub use metadata::MetadataStore;
pub use processor::Processor;
pub use registry::{ResizeMethod, SizeRegistry, SizeSpec, Transform};
pub use thumbnail::{FallbackImage, Missing, StoredThumbnail, Thumbnail};

use std::collections::BTreeMap;
use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::ThumbnailError;
use crate::registry::{ResizeMethod, SizeRegistry, SizeSpec, Transform};

/// One entry of the `sizes` table.
#[derive(Debug, Deserialize, Clone)]
pub struct SizeConfig {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub method: ResizeMethod,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub quality: Option<u8>,
    #[serde(default)]
    pub fallback_url: Option<String>,
}

/// Blob store settings.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory of the filesystem store. Default: "media".
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
    /// URL prefix blobs are served under. Default: "/media".
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Directory thumbnails are written to, relative to the store root. Default: "thumbs".
    #[serde(default = "default_thumbnail_dir")]
    pub thumbnail_dir: String,
    /// Largest accepted blob in bytes. Default: 20 MiB.
    #[serde(default = "default_max_size")]
    pub max_size: u64,
}

fn default_base_path() -> PathBuf {
    PathBuf::from("media")
}
fn default_base_url() -> String {
    "/media".into()
}
fn default_thumbnail_dir() -> String {
    "thumbs".into()
}
fn default_max_size() -> u64 {
    20 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            base_url: default_base_url(),
            thumbnail_dir: default_thumbnail_dir(),
            max_size: default_max_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MetadataBackend {
    Memory,
    #[default]
    Database,
    Redis,
}

/// Metadata store settings.
#[derive(Debug, Deserialize, Clone)]
pub struct MetadataConfig {
    #[serde(default)]
    pub backend: MetadataBackend,
    /// Database or Redis URL. Default: "sqlite://thumbnails.db?mode=rwc".
    #[serde(default = "default_metadata_url")]
    pub url: String,
    /// Key namespace for the Redis backend. Default: "thumbnails".
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Database pool size. Default: 5.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_metadata_url() -> String {
    "sqlite://thumbnails.db?mode=rwc".into()
}
fn default_key_prefix() -> String {
    "thumbnails".into()
}
fn default_max_connections() -> u32 {
    5
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            backend: MetadataBackend::default(),
            url: default_metadata_url(),
            key_prefix: default_key_prefix(),
            max_connections: default_max_connections(),
        }
    }
}

/// Generation settings.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct GenerationConfig {
    /// Serialize generation per `(source, size)` within this process.
    #[serde(default)]
    pub lock: bool,
    /// Deadline for each backend call, in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Thumbnails application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ThumbnailsConfig {
    #[serde(default)]
    pub sizes: BTreeMap<String, SizeConfig>,
    #[serde(default)]
    pub default_size: Option<String>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl ThumbnailsConfig {
    /// Load `config/thumbnails.*` (or `$THUMBNAILS_CONFIG`), then apply
    /// `THUMBNAILS__*` environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("THUMBNAILS_CONFIG")
            .unwrap_or_else(|_| "config/thumbnails".to_string());
        Self::load_from(&config_path)
    }

    /// Like [`load`](Self::load) with an explicit file path (extension optional).
    pub fn load_from(config_path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("storage.base_path", "media")?
            .set_default("storage.base_url", "/media")?
            .set_default("storage.thumbnail_dir", "thumbs")?
            .set_default("metadata.backend", "database")?
            .set_default("metadata.url", "sqlite://thumbnails.db?mode=rwc")?
            .set_default("generation.lock", false)?
            .add_source(File::with_name(config_path).required(false))
            .add_source(Environment::with_prefix("THUMBNAILS").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Parse a TOML document without touching the environment.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Build the size registry described by `sizes` and `default_size`.
    pub fn registry(&self) -> Result<SizeRegistry, ThumbnailError> {
        let specs = self.sizes.iter().map(|(name, size)| {
            let mut transform = Transform::new(size.width, size.height, size.method);
            transform.format = size.format.clone();
            transform.quality = size.quality;
            SizeSpec {
                name: name.clone(),
                transform,
                fallback_url: size.fallback_url.clone(),
            }
        });
        SizeRegistry::new(specs, self.default_size.clone())
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ThumbnailError;

/// Size name used for `exists`/`delete` calls without an explicit size when
/// no `default_size` is configured.
pub const DEFAULT_SIZE_NAME: &str = "default";

/// How a source is fitted into the target box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMethod {
    /// Scale down preserving aspect ratio so the image fits inside the box.
    #[default]
    Fit,
    /// Scale and crop so the image covers the whole box.
    Fill,
    /// Stretch to exactly the box dimensions.
    Exact,
}

/// Parameters handed to the [`Processor`](crate::processor::Processor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transform {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub method: ResizeMethod,
    /// Output extension (e.g. `"webp"`). Keeps the source format when unset.
    #[serde(default)]
    pub format: Option<String>,
    /// JPEG quality, 1-100.
    #[serde(default)]
    pub quality: Option<u8>,
}

impl Transform {
    pub fn new(width: u32, height: u32, method: ResizeMethod) -> Self {
        Self {
            width,
            height,
            method,
            format: None,
            quality: None,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }
}

/// One named thumbnail variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeSpec {
    pub name: String,
    pub transform: Transform,
    /// Placeholder served when no source image is bound.
    pub fallback_url: Option<String>,
}

impl SizeSpec {
    pub fn new(name: impl Into<String>, transform: Transform) -> Self {
        Self {
            name: name.into(),
            transform,
            fallback_url: None,
        }
    }

    pub fn with_fallback(mut self, url: impl Into<String>) -> Self {
        self.fallback_url = Some(url.into());
        self
    }

    fn validate(&self) -> Result<(), ThumbnailError> {
        let valid_name = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid_name {
            return Err(ThumbnailError::Config(format!(
                "size name '{}' must be non-empty and use only [A-Za-z0-9_-]",
                self.name
            )));
        }
        if self.transform.width == 0 || self.transform.height == 0 {
            return Err(ThumbnailError::Config(format!(
                "size '{}' must have non-zero width and height",
                self.name
            )));
        }
        if let Some(quality) = self.transform.quality {
            if !(1..=100).contains(&quality) {
                return Err(ThumbnailError::Config(format!(
                    "size '{}' has quality {quality}, expected 1-100",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Immutable set of configured sizes.
///
/// Built once at startup and shared behind an `Arc`; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct SizeRegistry {
    sizes: BTreeMap<String, SizeSpec>,
    default_size: Option<String>,
}

impl SizeRegistry {
    /// Build a registry.
    ///
    /// `default_size` names the primary size. When `None`, a size called
    /// [`DEFAULT_SIZE_NAME`] is used if present.
    pub fn new(
        sizes: impl IntoIterator<Item = SizeSpec>,
        default_size: Option<String>,
    ) -> Result<Self, ThumbnailError> {
        let mut map = BTreeMap::new();
        for spec in sizes {
            spec.validate()?;
            if map.contains_key(&spec.name) {
                return Err(ThumbnailError::Config(format!(
                    "size '{}' is defined twice",
                    spec.name
                )));
            }
            map.insert(spec.name.clone(), spec);
        }

        let default_size = match default_size {
            Some(name) if !map.contains_key(&name) => {
                return Err(ThumbnailError::Config(format!(
                    "default_size '{name}' is not a configured size"
                )));
            }
            Some(name) => Some(name),
            None => map
                .contains_key(DEFAULT_SIZE_NAME)
                .then(|| DEFAULT_SIZE_NAME.to_string()),
        };

        Ok(Self {
            sizes: map,
            default_size,
        })
    }

    /// Look up a size, failing with [`ThumbnailError::UnknownSize`].
    pub fn get(&self, name: &str) -> Result<&SizeSpec, ThumbnailError> {
        self.sizes
            .get(name)
            .ok_or_else(|| ThumbnailError::UnknownSize(name.to_string()))
    }

    /// Resolve an optional size name, falling back to the primary size.
    pub fn resolve(&self, name: Option<&str>) -> Result<&SizeSpec, ThumbnailError> {
        match name {
            Some(name) => self.get(name),
            None => match &self.default_size {
                Some(name) => self.get(name),
                None => Err(ThumbnailError::UnknownSize(DEFAULT_SIZE_NAME.to_string())),
            },
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sizes.contains_key(name)
    }

    pub fn default_size(&self) -> Option<&str> {
        self.default_size.as_deref()
    }

    /// Size names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sizes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SizeSpec> {
        self.sizes.values()
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}

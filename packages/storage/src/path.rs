use std::fmt;

use rand::distr::{Alphanumeric, SampleString};

use super::error::StorageError;

/// A validated, `/`-separated blob path relative to a store root.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BlobPath(String);

impl BlobPath {
    /// Validate a relative blob path.
    ///
    /// Rejects empty paths, absolute paths, backslashes and any `.`/`..`
    /// component so a path can never escape the store root.
    pub fn parse(s: &str) -> Result<Self, StorageError> {
        if s.is_empty() {
            return Err(StorageError::InvalidPath("path is empty".into()));
        }
        if s.starts_with('/') || s.contains('\\') {
            return Err(StorageError::InvalidPath(format!("'{s}' is not relative")));
        }
        for component in s.split('/') {
            match component {
                "" => {
                    return Err(StorageError::InvalidPath(format!(
                        "'{s}' contains an empty component"
                    )));
                }
                "." | ".." => {
                    return Err(StorageError::InvalidPath(format!(
                        "'{s}' contains a relative component"
                    )));
                }
                _ => {}
            }
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory part of the path, `None` for top-level blobs.
    pub fn parent(&self) -> Option<&str> {
        self.0.rsplit_once('/').map(|(dir, _)| dir)
    }

    /// Final component of the path.
    pub fn file_name(&self) -> &str {
        self.0.rsplit_once('/').map_or(self.0.as_str(), |(_, name)| name)
    }

    /// File name without its extension.
    pub fn file_stem(&self) -> &str {
        let name = self.file_name();
        match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => name,
        }
    }

    /// Extension without the leading dot, lowercased.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
                Some(ext.to_ascii_lowercase())
            }
            _ => None,
        }
    }
}

impl fmt::Debug for BlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobPath({})", self.0)
    }
}

impl fmt::Display for BlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BlobPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive a sibling name for a path that is already taken by inserting a
/// random suffix before the extension: `a/b.png` becomes `a/b_x7Kq2Lm.png`.
pub fn alternative_name(path: &BlobPath) -> BlobPath {
    let suffix = Alphanumeric.sample_string(&mut rand::rng(), 7);
    let file = match path.extension() {
        Some(ext) => format!("{}_{suffix}.{ext}", path.file_stem()),
        None => format!("{}_{suffix}", path.file_stem()),
    };
    let joined = match path.parent() {
        Some(dir) => format!("{dir}/{file}"),
        None => file,
    };
    BlobPath(joined)
}

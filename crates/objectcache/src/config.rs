//! Where the object cache lives and whether it accepts writes.

use std::path::PathBuf;

/// Configuration for the object cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Root directory.
    /// Objects live in `{base_path}/objects/`, in-flight writes in `{base_path}/staging/`.
    pub base_path: PathBuf,

    /// Read-only mode - rejects inserts.
    pub read_only: bool,
}

impl CacheConfig {
    /// Create a writable config rooted at a specific path.
    pub fn with_base_path(path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: path.into(),
            read_only: false,
        }
    }

    /// Create a read-only config rooted at a specific path.
    pub fn read_only(path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: path.into(),
            read_only: true,
        }
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.base_path.join("objects")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.base_path.join("staging")
    }
}

//! ObjectCache: filesystem-backed content-addressed storage.
//!
//! Layout:
//! ```text
//! {base_path}/
//! ├── objects/
//! │   ├── ab/
//! │   │   └── cd/
//! │   │       └── ef0123...  # Content file (remainder of digest)
//! │   └── 12/
//! │       └── ...
//! └── staging/
//!     └── 6f1c...            # In-flight writes from store()
//! ```
//!
//! The only externally visible mutation is a rename into `objects/`, so a
//! reader never sees a partially written object.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::CacheConfig;
use crate::hash::Digest;
use crate::remediation::{self, Remediation};

/// Trait for content storage backends.
pub trait ObjectStore: Send + Sync {
    /// Store bytes, returning their digest.
    ///
    /// If the content already exists, returns the digest without writing.
    fn store(&self, data: &[u8]) -> Result<Digest>;

    /// Retrieve bytes by digest. Returns `Ok(None)` if absent.
    fn retrieve(&self, digest: &Digest) -> Result<Option<Vec<u8>>>;

    fn exists(&self, digest: &Digest) -> bool;

    /// Filesystem path of the object, if present.
    fn path(&self, digest: &Digest) -> Option<PathBuf>;
}

/// Filesystem-based object cache.
#[derive(Debug, Clone)]
pub struct ObjectCache {
    config: CacheConfig,
    remediation: Arc<dyn Remediation>,
}

impl ObjectCache {
    /// Create a new ObjectCache with the given configuration.
    ///
    /// Creates the objects and staging directories unless read-only.
    pub fn new(config: CacheConfig) -> Result<Self> {
        if !config.read_only {
            fs::create_dir_all(config.objects_dir())
                .context("failed to create objects directory")?;
            fs::create_dir_all(config.staging_dir())
                .context("failed to create staging directory")?;
        }

        Ok(Self {
            config,
            remediation: remediation::platform_default(),
        })
    }

    /// Create an ObjectCache rooted at a specific path.
    pub fn at_path(path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(CacheConfig::with_base_path(path))
    }

    /// Create a read-only ObjectCache rooted at a specific path.
    pub fn read_only_at(path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(CacheConfig::read_only(path))
    }

    /// Replace the hook run before retrying a move refused with a permission error.
    pub fn with_remediation(mut self, remediation: Arc<dyn Remediation>) -> Self {
        self.remediation = remediation;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Absolute path where an object is (or would be) stored.
    pub fn object_path(&self, digest: &Digest) -> PathBuf {
        self.config.objects_dir().join(digest.object_path())
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.config.read_only {
            anyhow::bail!("object cache is in read-only mode");
        }
        Ok(())
    }

    /// Move a source file into the cache, returning its digest.
    ///
    /// The source is consumed. If an object with the same digest already
    /// exists the move is skipped and the source is removed instead.
    pub fn insert(&self, source: &Path) -> Result<Digest> {
        self.ensure_writable()?;

        let digest = Digest::from_file(source)
            .with_context(|| format!("failed to hash {}", source.display()))?;
        let obj_path = self.object_path(&digest);

        if let Some(parent) = obj_path.parent() {
            fs::create_dir_all(parent).context("failed to create object prefix directory")?;
        }

        if obj_path.exists() {
            debug!(digest = %digest, source = %source.display(), "object already cached");
            if same_file(source, &obj_path) {
                return Ok(digest);
            }
            if let Err(e) = fs::remove_file(source) {
                warn!(source = %source.display(), error = %e, "failed to remove duplicate source");
            }
            return Ok(digest);
        }

        move_with_remediation(source, &obj_path, self.remediation.as_ref(), |from, to| {
            self.relocate(from, to)
        })
        .with_context(|| {
            format!(
                "failed to move {} to {}",
                source.display(),
                obj_path.display()
            )
        })?;

        debug!(digest = %digest, source = %source.display(), "object inserted");
        Ok(digest)
    }

    /// Rename, or copy through staging when the source lives on another device.
    fn relocate(&self, from: &Path, to: &Path) -> io::Result<()> {
        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
                let temp = self.config.staging_dir().join(Uuid::new_v4().simple().to_string());
                if let Err(e) = fs::copy(from, &temp).and_then(|_| fs::rename(&temp, to)) {
                    let _ = fs::remove_file(&temp);
                    return Err(e);
                }
                fs::remove_file(from)
            }
            Err(e) => Err(e),
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Run `mv`, and if it fails with `PermissionDenied` remediate once and retry once.
pub(crate) fn move_with_remediation<F>(
    source: &Path,
    dest: &Path,
    remediation: &dyn Remediation,
    mut mv: F,
) -> io::Result<()>
where
    F: FnMut(&Path, &Path) -> io::Result<()>,
{
    match mv(source, dest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            warn!(source = %source.display(), error = %e, "move refused, remediating and retrying once");
            if let Err(err) = remediation.remediate(source) {
                debug!(source = %source.display(), error = %err, "remediation failed");
            }
            mv(source, dest)
        }
        Err(e) => Err(e),
    }
}

impl ObjectStore for ObjectCache {
    fn store(&self, data: &[u8]) -> Result<Digest> {
        self.ensure_writable()?;

        let digest = Digest::from_data(data);
        if self.object_path(&digest).exists() {
            return Ok(digest);
        }

        let temp = self
            .config
            .staging_dir()
            .join(Uuid::new_v4().simple().to_string());
        {
            let mut file = fs::File::create(&temp).context("failed to create staging file")?;
            file.write_all(data).context("failed to write staging file")?;
            file.sync_all().context("failed to sync staging file")?;
        }

        match self.insert(&temp) {
            Ok(stored) => Ok(stored),
            Err(e) => {
                let _ = fs::remove_file(&temp);
                Err(e)
            }
        }
    }

    fn retrieve(&self, digest: &Digest) -> Result<Option<Vec<u8>>> {
        let path = self.object_path(digest);
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context("failed to read object file"),
        }
    }

    fn exists(&self, digest: &Digest) -> bool {
        self.object_path(digest).exists()
    }

    fn path(&self, digest: &Digest) -> Option<PathBuf> {
        let path = self.object_path(digest);
        if path.exists() {
            Some(path)
        } else {
            None
        }
    }
}

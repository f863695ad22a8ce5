//! Serves files from a directory tree, re-reading them on every request.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{FilegenError, Result};
use crate::generator::{GeneratedFile, Generator};
use crate::request::{normalize_path, strip_mount, Request};

/// Maps `mount` onto `root`. `root` may be a directory or a single file;
/// a single file is served only for the exact mount path.
#[derive(Debug, Clone)]
pub struct StaticTreeGenerator {
    root: PathBuf,
    mount: String,
}

impl StaticTreeGenerator {
    /// Fails if `root` does not exist or cannot be resolved.
    pub fn new(root: impl AsRef<Path>, mount: &str) -> Result<Self> {
        let root = root.as_ref();
        let root = std::fs::canonicalize(root).map_err(|e| FilegenError::io(root, e))?;
        Ok(Self {
            root,
            mount: normalize_path(mount),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }

    /// Resolve a request path to a file below the root.
    async fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative =
            strip_mount(path, &self.mount).ok_or_else(|| FilegenError::NotFound(path.to_string()))?;

        let mut candidate = self.root.clone();
        for component in relative.split('/').filter(|c| !c.is_empty()) {
            if component == ".." {
                return Err(FilegenError::NotFound(path.to_string()));
            }
            candidate.push(component);
        }

        // Symlinks may still point outside the tree.
        let resolved = match tokio::fs::canonicalize(&candidate).await {
            Ok(resolved) => resolved,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                return Err(FilegenError::io(candidate, e))
            }
            // Missing, a file used as a directory, a symlink loop...
            Err(e) => {
                debug!(path, error = %e, "unresolvable request path");
                return Err(FilegenError::NotFound(path.to_string()));
            }
        };
        if !resolved.starts_with(&self.root) {
            debug!(path, resolved = %resolved.display(), "request escapes tree");
            return Err(FilegenError::NotFound(path.to_string()));
        }
        Ok(resolved)
    }
}

#[async_trait]
impl Generator for StaticTreeGenerator {
    async fn produce(&self, request: &Request) -> Result<GeneratedFile> {
        let file = self.resolve(&request.path).await?;

        let metadata = tokio::fs::metadata(&file)
            .await
            .map_err(|e| FilegenError::io(&file, e))?;
        if !metadata.is_file() {
            return Err(FilegenError::NotFound(request.path.clone()));
        }

        match tokio::fs::read(&file).await {
            Ok(data) => Ok(GeneratedFile::new(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(FilegenError::NotFound(request.path.clone()))
            }
            Err(e) => Err(FilegenError::io(file, e)),
        }
    }

    fn kind(&self) -> &'static str {
        "static-tree"
    }

    fn describe(&self) -> String {
        format!("{} -> {}", self.mount, self.root.display())
    }
}

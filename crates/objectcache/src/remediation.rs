//! Pre-retry remediation for moves that fail with a permission error.
//!
//! On Linux a file carrying the immutable or append-only attribute cannot be
//! renamed even by its owner. The object cache clears those attributes once
//! and retries the move; platforms without such attributes use a no-op.

use std::fmt;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

/// Hook run once before retrying a move that failed with `PermissionDenied`.
pub trait Remediation: Send + Sync + fmt::Debug {
    /// Try to make `path` movable. Errors are logged by the caller and the
    /// retry happens regardless.
    fn remediate(&self, path: &Path) -> io::Result<()>;
}

/// Clears the immutable and append-only attributes with `chattr -ai`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClearImmutable;

impl Remediation for ClearImmutable {
    fn remediate(&self, path: &Path) -> io::Result<()> {
        let status = Command::new("chattr")
            .arg("-ai")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("chattr -ai exited with {}", status),
            ))
        }
    }
}

/// Does nothing; the retry still happens.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRemediation;

impl Remediation for NoRemediation {
    fn remediate(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }
}

/// The remediation appropriate for this platform.
pub fn platform_default() -> Arc<dyn Remediation> {
    if cfg!(target_os = "linux") {
        Arc::new(ClearImmutable)
    } else {
        Arc::new(NoRemediation)
    }
}

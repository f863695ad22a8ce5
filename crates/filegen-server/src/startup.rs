//! Bringing generators up at process start.

use anyhow::{Context, Result};
use filegen::{Manager, ReloadSupervisor};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Load the generator configuration, then register `directories` at `/`.
///
/// Directories are registered last so that files present in them at
/// startup take precedence over the configuration's prefixes.
pub fn start_generators(
    manager: &Manager,
    supervisor: Option<&Arc<ReloadSupervisor>>,
    permit_insecure_mode: bool,
    directories: &[PathBuf],
) -> Result<Option<JoinHandle<()>>> {
    let watcher = match supervisor {
        Some(supervisor) => {
            let config = supervisor.config_path();
            let handle = supervisor
                .start(manager, permit_insecure_mode)
                .with_context(|| format!("failed to load generators from {}", config.display()))?;
            info!("Generators from {} ({} registrations)", config.display(), manager.len());
            Some(handle)
        }
        None => None,
    };

    for dir in directories {
        let count = manager
            .register_directory(dir, "/")
            .with_context(|| format!("failed to register {}", dir.display()))?;
        info!("Serving {} at / ({} files)", dir.display(), count);
    }

    Ok(watcher)
}

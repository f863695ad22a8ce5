//! Polls a single file for changes.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEvent {
    /// Sent once when watching starts.
    Watching,
    /// The file was modified, replaced, created or removed.
    Changed,
}

/// What a poll compares: a change to any field is a change to the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    modified: Option<SystemTime>,
    len: u64,
    inode: u64,
}

impl Fingerprint {
    /// Fingerprint `path` now. `None` when it does not exist.
    pub fn of(path: &Path) -> Option<Self> {
        let metadata = std::fs::metadata(path).ok()?;
        #[cfg(unix)]
        let inode = std::os::unix::fs::MetadataExt::ino(&metadata);
        #[cfg(not(unix))]
        let inode = 0;
        Some(Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
            inode,
        })
    }
}

/// Watch `path`, checking every `interval`.
///
/// The task stops when the receiver is dropped.
pub fn watch_file(path: impl Into<PathBuf>, interval: Duration) -> mpsc::Receiver<FileEvent> {
    let path = path.into();
    let baseline = Fingerprint::of(&path);
    watch_file_from(path, interval, baseline)
}

/// Like [`watch_file`], but changes are measured against `baseline`.
///
/// A file that already differs from `baseline` is reported as changed on
/// the first poll.
pub fn watch_file_from(
    path: impl Into<PathBuf>,
    interval: Duration,
    baseline: Option<Fingerprint>,
) -> mpsc::Receiver<FileEvent> {
    let path = path.into();
    let (tx, rx) = mpsc::channel(8);

    tokio::spawn(async move {
        let mut last = baseline;
        if tx.send(FileEvent::Watching).await.is_err() {
            return;
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let checked = path.clone();
            let current = tokio::task::spawn_blocking(move || Fingerprint::of(&checked))
                .await
                .unwrap_or(None);
            if current == last {
                continue;
            }
            debug!(path = %path.display(), "watched file changed");
            last = current;
            if tx.send(FileEvent::Changed).await.is_err() {
                return;
            }
        }
    });

    rx
}

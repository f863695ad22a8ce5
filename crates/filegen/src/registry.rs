//! The generator registry.
//!
//! Registrations live in an immutable snapshot behind a single handle.
//! Writers build a modified copy and swap it in; readers clone the handle and
//! release the lock before doing anything else. A lookup therefore sees either
//! all of a batch or none of it, and no lock is held while a generator runs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;
use tokio::sync::watch;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{FilegenError, Result};
use crate::generator::{GeneratedFile, Generator};
use crate::request::{normalize_path, Request};
use crate::static_tree::StaticTreeGenerator;

/// A generator installed at a prefix.
#[derive(Clone)]
pub struct Registration {
    pub prefix: String,
    pub generator: Arc<dyn Generator>,
    pub registered_at: SystemTime,
    /// Increases with every registration; later wins.
    pub sequence: u64,
    /// Registered for a file found under a directory mount rather than by
    /// name. Routes only while no newer explicit registration covers it.
    pub member: bool,
}

/// A registration waiting to be swapped in.
#[derive(Clone)]
pub struct StagedRegistration {
    pub prefix: String,
    pub generator: Arc<dyn Generator>,
    pub member: bool,
}

impl StagedRegistration {
    pub fn explicit(prefix: impl Into<String>, generator: Arc<dyn Generator>) -> Self {
        Self {
            prefix: prefix.into(),
            generator,
            member: false,
        }
    }

    pub fn member(prefix: impl Into<String>, generator: Arc<dyn Generator>) -> Self {
        Self {
            prefix: prefix.into(),
            generator,
            member: true,
        }
    }
}

/// Status view of one registration.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationSummary {
    pub prefix: String,
    pub kind: &'static str,
    pub summary: String,
    pub registered_at: DateTime<Utc>,
    pub sequence: u64,
    pub member: bool,
}

#[derive(Default)]
struct Snapshot {
    entries: BTreeMap<String, Registration>,
    next_sequence: u64,
    generation: u64,
}

impl Snapshot {
    fn with_batch(&self, batch: Vec<StagedRegistration>) -> Snapshot {
        let mut entries = self.entries.clone();
        let mut next_sequence = self.next_sequence;
        let registered_at = SystemTime::now();
        for staged in batch {
            let prefix = normalize_path(&staged.prefix);
            entries.insert(
                prefix.clone(),
                Registration {
                    prefix,
                    generator: staged.generator,
                    registered_at,
                    sequence: next_sequence,
                    member: staged.member,
                },
            );
            next_sequence += 1;
        }
        Snapshot {
            entries,
            next_sequence,
            generation: self.generation + 1,
        }
    }
}

/// Maps path prefixes to generators.
pub struct Manager {
    current: RwLock<Arc<Snapshot>>,
    changes: watch::Sender<u64>,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            current: RwLock::new(Arc::new(Snapshot::default())),
            changes,
        }
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        // The guarded value is only ever replaced whole, so a poisoned lock
        // still holds a complete snapshot.
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install or replace the generator for `prefix`.
    pub fn register(&self, prefix: &str, generator: Arc<dyn Generator>) {
        self.register_all(vec![StagedRegistration::explicit(prefix, generator)]);
    }

    /// Install a batch of registrations in one step.
    pub fn register_all(&self, batch: Vec<StagedRegistration>) {
        let count = batch.len();
        let generation = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            let next = Arc::new(current.with_batch(batch));
            let generation = next.generation;
            *current = next;
            generation
        };
        debug!(count, generation, "registrations swapped in");
        self.changes.send_replace(generation);
    }

    /// Register every file below `root` at `mount_prefix`.
    ///
    /// Returns the number of registrations added.
    pub fn register_directory(&self, root: impl AsRef<Path>, mount_prefix: &str) -> Result<usize> {
        let batch = directory_family(root.as_ref(), mount_prefix)?;
        let count = batch.len();
        self.register_all(batch);
        info!(root = %root.as_ref().display(), mount = mount_prefix, count, "registered directory");
        Ok(count)
    }

    /// The generator with the longest prefix covering `path`.
    pub fn lookup(&self, path: &str) -> Result<Arc<dyn Generator>> {
        self.lookup_registration(path).map(|r| r.generator)
    }

    /// The registration that serves `path`.
    ///
    /// The longest explicit prefix wins. A directory member entry on the way
    /// wins over it only when the member was registered later.
    pub fn lookup_registration(&self, path: &str) -> Result<Registration> {
        let path = normalize_path(path);
        let snapshot = self.snapshot();

        let mut member: Option<&Registration> = None;
        let mut candidate = path.as_str();
        loop {
            if let Some(registration) = snapshot.entries.get(candidate) {
                if registration.member {
                    member.get_or_insert(registration);
                } else {
                    let chosen = match member {
                        Some(m) if m.sequence > registration.sequence => m,
                        _ => registration,
                    };
                    return Ok(chosen.clone());
                }
            }
            if candidate == "/" {
                return member
                    .cloned()
                    .ok_or(FilegenError::NoGenerator(path));
            }
            candidate = match candidate.rfind('/') {
                Some(0) => "/",
                Some(idx) => &candidate[..idx],
                None => "/",
            };
        }
    }

    /// Look up the generator for a request and run it.
    pub async fn get_file(&self, request: &Request) -> Result<GeneratedFile> {
        let generator = self.lookup(&request.path)?;
        generator.produce(request).await
    }

    pub fn len(&self) -> usize {
        self.snapshot().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of snapshots swapped in so far.
    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    /// Receive the generation number each time registrations change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// All registrations, ordered by prefix.
    pub fn describe(&self) -> Vec<RegistrationSummary> {
        self.snapshot()
            .entries
            .values()
            .map(|r| RegistrationSummary {
                prefix: r.prefix.clone(),
                kind: r.generator.kind(),
                summary: r.generator.describe(),
                registered_at: DateTime::<Utc>::from(r.registered_at),
                sequence: r.sequence,
                member: r.member,
            })
            .collect()
    }

    /// Render the registrations as an HTML fragment for a status page.
    pub fn write_html<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let summaries = self.describe();
        writeln!(writer, "<h2>Generators</h2>")?;
        writeln!(
            writer,
            "<p>{} registrations, generation {}</p>",
            summaries.len(),
            self.generation()
        )?;
        writeln!(writer, "<table border=\"1\" style=\"border-collapse: collapse\">")?;
        writeln!(
            writer,
            "<tr><th>Prefix</th><th>Kind</th><th>Generator</th><th>Registered</th></tr>"
        )?;
        for summary in summaries {
            writeln!(
                writer,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&summary.prefix),
                summary.kind,
                escape_html(&summary.summary),
                summary.registered_at.format("%Y-%m-%d %H:%M:%S UTC"),
            )?;
        }
        writeln!(writer, "</table>")
    }
}

/// Build the registrations for a directory tree without installing them.
///
/// One generator serves the whole tree. It is registered explicitly at the
/// mount prefix and as a member at every regular file present now.
pub fn directory_family(root: &Path, mount_prefix: &str) -> Result<Vec<StagedRegistration>> {
    let mount = normalize_path(mount_prefix);
    let metadata = std::fs::metadata(root).map_err(|e| FilegenError::io(root, e))?;
    if !metadata.is_dir() {
        return Err(FilegenError::io(
            root,
            io::Error::new(io::ErrorKind::Other, "not a directory"),
        ));
    }

    let generator: Arc<dyn Generator> = Arc::new(StaticTreeGenerator::new(root, &mount)?);
    let mut batch = vec![StagedRegistration::explicit(mount.clone(), generator.clone())];

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop"));
            FilegenError::io(path, source)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let prefix = normalize_path(&format!("{}/{}", mount, relative.join("/")));
        batch.push(StagedRegistration::member(prefix, generator.clone()));
    }

    Ok(batch)
}

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

//! Move every regular file in a tree into an object cache.
//!
//! Prints `<hash>  <original path>` for each file so the mapping can be kept.
//! The tree is left with only its directories.

use anyhow::{Context, Result};
use clap::Parser;
use objectcache::ObjectCache;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Tree whose files are moved into the cache
    directory: PathBuf,

    /// Object cache root
    cache_dir: PathBuf,
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    let cache = ObjectCache::at_path(&cli.cache_dir)
        .with_context(|| format!("failed to open object cache at {}", cli.cache_dir.display()))?;
    // The cache may live inside the tree being imported.
    let cache_root = std::fs::canonicalize(&cli.cache_dir)
        .with_context(|| format!("failed to resolve {}", cli.cache_dir.display()))?;

    let mut files = Vec::new();
    for entry in WalkDir::new(&cli.directory).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", cli.directory.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let resolved = std::fs::canonicalize(entry.path())
            .with_context(|| format!("failed to resolve {}", entry.path().display()))?;
        if resolved.starts_with(&cache_root) {
            continue;
        }
        files.push(entry.into_path());
    }

    let mut failures = 0usize;
    for path in &files {
        match cache.insert(path) {
            Ok(digest) => println!("{}  {}", digest, path.display()),
            Err(e) => {
                warn!("{}: {:#}", path.display(), e);
                failures += 1;
            }
        }
    }

    info!(
        "moved {} of {} files into {}",
        files.len() - failures,
        files.len(),
        cli.cache_dir.display()
    );
    if failures > 0 {
        anyhow::bail!("{} files could not be moved", failures);
    }
    Ok(())
}

use anyhow::{Context, Result};
use clap::Parser;
use filegen::{ExecRestarter, Manager, ReloadSupervisor};
use filegen_server::{serve, start_generators, AppState};
use filegenconf::Settings;
use objectcache::ObjectCache;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Serve generated files and the object cache over HTTP.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Settings file to use instead of ./filegen.toml
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Generator configuration file to load and watch for changes
    #[arg(short, long)]
    config_file: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Object cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Keep serving when the generator configuration fails to load
    #[arg(long)]
    permit_insecure_mode: bool,

    /// Directories to serve at /
    directories: Vec<PathBuf>,
}

#[cfg(unix)]
fn running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn running_as_root() -> bool {
    false
}

#[tokio::main]
async fn main() -> Result<()> {
    // Captured before anything else touches argv or the environment.
    let restarter = ExecRestarter::capture().context("failed to capture process for re-execution")?;

    let cli = Cli::parse();

    if running_as_root() {
        anyhow::bail!("filegen-server refuses to run as root");
    }

    let (mut settings, sources) = Settings::load_with_sources_from(cli.settings.as_deref())
        .context("failed to load settings")?;
    if let Some(path) = cli.config_file.clone() {
        settings.paths.generators = path;
    }
    if let Some(port) = cli.port {
        settings.bind.http_port = port;
    }
    if let Some(dir) = cli.cache_dir.clone() {
        settings.paths.cache_dir = dir;
    }
    if cli.permit_insecure_mode {
        settings.security.permit_insecure_mode = true;
    }

    let env_filter = EnvFilter::try_new(&settings.telemetry.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    for file in &sources.files {
        info!("Loaded settings from {}", file.display());
    }
    for var in &sources.env_overrides {
        info!("Settings override from ${}", var);
    }

    // --- Object Cache ---
    let cache_dir = &settings.paths.cache_dir;
    let cache = Arc::new(
        ObjectCache::at_path(cache_dir)
            .with_context(|| format!("failed to open object cache at {}", cache_dir.display()))?,
    );
    info!("Object cache at {}", cache_dir.display());

    // --- Generators ---
    let manager = Arc::new(Manager::new());
    let generators = settings.paths.generators.clone();
    let watch_generators =
        cli.config_file.is_some() || cli.directories.is_empty() || generators.exists();
    let supervisor = if watch_generators {
        Some(Arc::new(ReloadSupervisor::new(
            &generators,
            Duration::from_millis(settings.reload.poll_interval_ms),
            Box::new(restarter),
        )))
    } else {
        info!("No generator configuration at {}", generators.display());
        None
    };

    start_generators(
        &manager,
        supervisor.as_ref(),
        settings.security.permit_insecure_mode,
        &cli.directories,
    )?;

    let mut state = AppState::new(Arc::clone(&manager), cache);
    if let Some(supervisor) = supervisor {
        state = state.with_supervisor(supervisor);
    }

    if manager.is_empty() {
        warn!("No generators registered; every file request will be answered with 404");
    }

    serve::run(&settings.bind.address(), state).await
}

//! Applies configuration changes by restarting the whole process.
//!
//! Registrations from a configuration file are never patched in place. When
//! the file changes the supervisor hands off to a [`Restarter`], which by
//! default re-executes the running binary with the argv and environment it
//! started with.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{FilegenError, Result};
use crate::loader;
use crate::registry::Manager;
use crate::watch::{watch_file_from, FileEvent, Fingerprint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    ChangeDetected,
    Restarting,
}

impl SupervisorState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::ChangeDetected,
            2 => Self::Restarting,
            _ => Self::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ChangeDetected => "change-detected",
            Self::Restarting => "restarting",
        }
    }
}

/// Replaces the running process.
///
/// On success `restart` does not return.
pub trait Restarter: Send + Sync {
    fn restart(&self) -> Result<()>;
}

/// Re-executes the current binary.
#[derive(Debug, Clone)]
pub struct ExecRestarter {
    program: PathBuf,
    args: Vec<OsString>,
    env: Vec<(OsString, OsString)>,
}

impl ExecRestarter {
    /// Record the executable, argv and environment of this process.
    ///
    /// Call early, before anything changes the environment.
    pub fn capture() -> Result<Self> {
        let mut args: Vec<OsString> = std::env::args_os().collect();
        let program = std::env::current_exe().map_err(|e| FilegenError::Restart {
            program: args.first().map(PathBuf::from).unwrap_or_default(),
            source: e,
        })?;
        if args.is_empty() {
            args.push(program.clone().into_os_string());
        }
        Ok(Self {
            program,
            args,
            env: std::env::vars_os().collect(),
        })
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

impl Restarter for ExecRestarter {
    #[cfg(unix)]
    fn restart(&self) -> Result<()> {
        use std::os::unix::process::CommandExt;

        info!(program = %self.program.display(), "re-executing");
        let mut command = std::process::Command::new(&self.program);
        command
            .arg0(&self.args[0])
            .args(&self.args[1..])
            .env_clear()
            .envs(self.env.iter().map(|(k, v)| (k, v)));
        // exec only returns on failure.
        let source = command.exec();
        Err(FilegenError::Restart {
            program: self.program.clone(),
            source,
        })
    }

    #[cfg(not(unix))]
    fn restart(&self) -> Result<()> {
        Err(FilegenError::Restart {
            program: self.program.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "process re-execution needs a unix platform",
            ),
        })
    }
}

/// Watches the generator configuration file and restarts on change.
pub struct ReloadSupervisor {
    config_path: PathBuf,
    poll_interval: Duration,
    restarter: Box<dyn Restarter>,
    state: AtomicU8,
    restart_failures: AtomicU64,
}

impl ReloadSupervisor {
    pub fn new(
        config_path: impl Into<PathBuf>,
        poll_interval: Duration,
        restarter: Box<dyn Restarter>,
    ) -> Self {
        Self {
            config_path: config_path.into(),
            poll_interval,
            restarter,
            state: AtomicU8::new(SupervisorState::Idle as u8),
            restart_failures: AtomicU64::new(0),
        }
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    pub fn state(&self) -> SupervisorState {
        SupervisorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: SupervisorState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Restarts attempted that did not replace the process.
    pub fn restart_failures(&self) -> u64 {
        self.restart_failures.load(Ordering::SeqCst)
    }

    /// Load the configuration into `manager`, then start watching it.
    ///
    /// A failed initial load is returned as an error unless
    /// `permit_insecure_mode` is set, in which case it is logged and the
    /// registry is left as it was.
    pub fn start(
        self: &Arc<Self>,
        manager: &Manager,
        permit_insecure_mode: bool,
    ) -> Result<JoinHandle<()>> {
        // Taken before loading so an edit made during the load still counts.
        let baseline = Fingerprint::of(&self.config_path);
        match loader::load(&self.config_path, manager) {
            Ok(_) => {}
            Err(e) if permit_insecure_mode => {
                warn!(config = %self.config_path.display(), error = %e, "initial configuration load failed; continuing in insecure mode");
            }
            Err(e) => return Err(e),
        }

        let supervisor = Arc::clone(self);
        Ok(tokio::spawn(async move { supervisor.run_from(baseline).await }))
    }

    /// Handle watcher events until the watcher stops.
    pub async fn run(&self) {
        self.run_from(Fingerprint::of(&self.config_path)).await
    }

    async fn run_from(&self, baseline: Option<Fingerprint>) {
        let mut events = watch_file_from(&self.config_path, self.poll_interval, baseline);

        // The first event only says the watch is in place.
        if events.recv().await.is_none() {
            return;
        }
        info!(config = %self.config_path.display(), "watching generator configuration");

        while let Some(event) = events.recv().await {
            if event != FileEvent::Changed {
                continue;
            }
            self.set_state(SupervisorState::ChangeDetected);
            info!(config = %self.config_path.display(), "generator configuration changed");

            self.set_state(SupervisorState::Restarting);
            if let Err(e) = self.restarter.restart() {
                self.restart_failures.fetch_add(1, Ordering::SeqCst);
                error!(error = %e, "restart failed; continuing with the current configuration");
            }
            self.set_state(SupervisorState::Idle);
        }
    }
}

//! Process settings for filegen binaries.
//!
//! These are the settings of the server process itself: where the generator
//! configuration lives, where the object cache is, what to bind, how loud to
//! log. The generator configuration file is a separate document, parsed by
//! `filegen::loader`, and watched for changes at runtime.
//!
//! # Usage
//!
//! ```rust,no_run
//! use filegenconf::Settings;
//!
//! let settings = Settings::load().expect("Failed to load settings");
//! println!("generators: {}", settings.paths.generators.display());
//! println!("listening on {}", settings.bind.address());
//! ```
//!
//! # Settings File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/filegen/config.toml` (system)
//! 2. `~/.config/filegen/config.toml` (user)
//! 3. `./filegen.toml` (local override, or the `--settings` path)
//! 4. Environment variables (`FILEGEN_*`, `RUST_LOG`)
//!
//! # Example
//!
//! ```toml
//! [paths]
//! generators = "/var/lib/filegen-server/config"
//! cache_dir = "~/.filegen/objectcache"
//!
//! [bind]
//! http_port = 6972
//!
//! [telemetry]
//! log_level = "info"
//!
//! [reload]
//! poll_interval_ms = 1000
//!
//! [security]
//! permit_insecure_mode = false
//! ```

pub mod infra;
pub mod loader;

pub use infra::{BindConfig, PathsConfig, ReloadConfig, SecurityConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, expand_path, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Settings loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete process settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub bind: BindConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub reload: ReloadConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

impl Settings {
    /// Load settings from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load settings with `config_path` replacing the local override.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load settings and report which files and variables contributed.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = Settings::default();

        for path in loader::discover_config_files_with_override(config_path) {
            let file_config = loader::load_from_file(&path)?;
            config = loader::merge_configs(config, file_config);
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize settings to a TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# filegen settings\n\n");

        output.push_str("[paths]\n");
        output.push_str(&format!(
            "generators = \"{}\"\n",
            self.paths.generators.display()
        ));
        output.push_str(&format!("cache_dir = \"{}\"\n", self.paths.cache_dir.display()));

        output.push_str("\n[bind]\n");
        output.push_str(&format!("host = \"{}\"\n", self.bind.host));
        output.push_str(&format!("http_port = {}\n", self.bind.http_port));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = \"{}\"\n", self.telemetry.log_level));

        output.push_str("\n[reload]\n");
        output.push_str(&format!(
            "poll_interval_ms = {}\n",
            self.reload.poll_interval_ms
        ));

        output.push_str("\n[security]\n");
        output.push_str(&format!(
            "permit_insecure_mode = {}\n",
            self.security.permit_insecure_mode
        ));

        output
    }
}

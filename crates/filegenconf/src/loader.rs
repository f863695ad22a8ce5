//! Settings file discovery, loading, and environment variable overlay.

use crate::infra::{
    BindConfig, PathsConfig, ReloadConfig, SecurityConfig, TelemetryConfig,
};
use crate::{ConfigError, Settings};
use serde::de::DeserializeOwned;
use std::env;
use std::path::{Path, PathBuf};

/// Information about where settings came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Settings files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode file values
    pub env_overrides: Vec<String>,
}

/// Discover settings files in standard locations.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover settings files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/filegen/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("filegen/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("filegen.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load settings from a TOML file.
pub fn load_from_file(path: &Path) -> Result<Settings, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_toml(&contents, path)
}

/// Parse settings from a TOML string. Missing sections take their defaults.
pub(crate) fn parse_toml(contents: &str, path: &Path) -> Result<Settings, ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut paths: PathsConfig = section(&table, "paths", path)?;
    paths.generators = expand_path(&paths.generators.to_string_lossy());
    paths.cache_dir = expand_path(&paths.cache_dir.to_string_lossy());

    Ok(Settings {
        paths,
        bind: section(&table, "bind", path)?,
        telemetry: section(&table, "telemetry", path)?,
        reload: section(&table, "reload", path)?,
        security: section(&table, "security", path)?,
    })
}

fn section<T: DeserializeOwned + Default>(
    table: &toml::Table,
    name: &str,
    path: &Path,
) -> Result<T, ConfigError> {
    match table.get(name) {
        Some(value) => value.clone().try_into().map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: format!("[{}]: {}", name, e),
        }),
        None => Ok(T::default()),
    }
}

/// Take `overlay` where it differs from the compiled default, else `base`.
fn pick<T: PartialEq>(base: T, overlay: T, default: T) -> T {
    if overlay != default {
        overlay
    } else {
        base
    }
}

/// Merge two settings values, with `overlay` taking precedence.
pub fn merge_configs(base: Settings, overlay: Settings) -> Settings {
    let paths = PathsConfig::default();
    let bind = BindConfig::default();
    let telemetry = TelemetryConfig::default();
    let reload = ReloadConfig::default();
    let security = SecurityConfig::default();

    Settings {
        paths: PathsConfig {
            generators: pick(base.paths.generators, overlay.paths.generators, paths.generators),
            cache_dir: pick(base.paths.cache_dir, overlay.paths.cache_dir, paths.cache_dir),
        },
        bind: BindConfig {
            host: pick(base.bind.host, overlay.bind.host, bind.host),
            http_port: pick(base.bind.http_port, overlay.bind.http_port, bind.http_port),
        },
        telemetry: TelemetryConfig {
            log_level: pick(
                base.telemetry.log_level,
                overlay.telemetry.log_level,
                telemetry.log_level,
            ),
        },
        reload: ReloadConfig {
            poll_interval_ms: pick(
                base.reload.poll_interval_ms,
                overlay.reload.poll_interval_ms,
                reload.poll_interval_ms,
            ),
        },
        security: SecurityConfig {
            permit_insecure_mode: pick(
                base.security.permit_insecure_mode,
                overlay.security.permit_insecure_mode,
                security.permit_insecure_mode,
            ),
        },
    }
}

/// Apply environment variable overrides to settings.
pub fn apply_env_overrides(config: &mut Settings, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

fn apply_overrides_from<F>(config: &mut Settings, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut record = |key: &str| sources.env_overrides.push(key.to_string());

    if let Some(v) = lookup("FILEGEN_GENERATORS") {
        config.paths.generators = expand_path(&v);
        record("FILEGEN_GENERATORS");
    }
    if let Some(v) = lookup("FILEGEN_CACHE_DIR") {
        config.paths.cache_dir = expand_path(&v);
        record("FILEGEN_CACHE_DIR");
    }
    if let Some(v) = lookup("FILEGEN_HOST") {
        config.bind.host = v;
        record("FILEGEN_HOST");
    }
    if let Some(port) = lookup("FILEGEN_HTTP_PORT").and_then(|v| v.parse().ok()) {
        config.bind.http_port = port;
        record("FILEGEN_HTTP_PORT");
    }
    if let Some(v) = lookup("FILEGEN_LOG_LEVEL") {
        config.telemetry.log_level = v;
        record("FILEGEN_LOG_LEVEL");
    }
    // RUST_LOG wins over everything else
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        record("RUST_LOG");
    }
    if let Some(ms) = lookup("FILEGEN_POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
        config.reload.poll_interval_ms = ms;
        record("FILEGEN_POLL_INTERVAL_MS");
    }
    if let Some(v) = lookup("FILEGEN_PERMIT_INSECURE_MODE") {
        config.security.permit_insecure_mode = v.to_lowercase() == "true" || v == "1";
        record("FILEGEN_PERMIT_INSECURE_MODE");
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
        PathBuf::from(path)
    } else if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        match stripped.split_once('/') {
            Some((var_name, rest)) => env::var(var_name)
                .map(|value| PathBuf::from(value).join(rest))
                .unwrap_or_else(|_| PathBuf::from(path)),
            None => env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path)),
        }
    } else {
        PathBuf::from(path)
    }
}

//! Process settings sections. None of these change while a process runs;
//! editing them takes effect on the next start.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filesystem paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Generator configuration file watched by the reload supervisor.
    /// Default: /var/lib/filegen-server/config
    #[serde(default = "PathsConfig::default_generators")]
    pub generators: PathBuf,

    /// Object cache root.
    /// Default: ~/.filegen/objectcache
    #[serde(default = "PathsConfig::default_cache_dir")]
    pub cache_dir: PathBuf,
}

impl PathsConfig {
    fn default_generators() -> PathBuf {
        PathBuf::from("/var/lib/filegen-server/config")
    }

    fn default_cache_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".filegen/objectcache"))
            .unwrap_or_else(|| PathBuf::from(".filegen/objectcache"))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            generators: Self::default_generators(),
            cache_dir: Self::default_cache_dir(),
        }
    }
}

/// Network bind settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindConfig {
    /// Address to listen on.
    /// Default: 0.0.0.0
    #[serde(default = "BindConfig::default_host")]
    pub host: String,

    /// HTTP port for file, object and status endpoints.
    /// Default: 6972
    #[serde(default = "BindConfig::default_http_port")]
    pub http_port: u16,
}

impl BindConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_http_port() -> u16 {
        6972
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            http_port: Self::default_http_port(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// Generator configuration reload settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReloadConfig {
    /// How often the generator configuration file is checked for changes.
    /// Default: 1000
    #[serde(default = "ReloadConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl ReloadConfig {
    fn default_poll_interval_ms() -> u64 {
        1000
    }
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: Self::default_poll_interval_ms(),
        }
    }
}

/// Startup safety settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Keep serving when the initial generator load fails.
    /// Default: false
    #[serde(default)]
    pub permit_insecure_mode: bool,
}

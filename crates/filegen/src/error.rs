//! Error types for generation, registration, loading and restart.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FilegenError>;

#[derive(Debug, Error)]
pub enum FilegenError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("no generator registered for {0}")]
    NoGenerator(String),

    #[error("generation failed for {path}: {reason}")]
    Generation { path: String, reason: String },

    /// A malformed generator entry. `entry` is 1-based.
    #[error("configuration entry {entry} (prefix {prefix}): {reason}")]
    Configuration {
        entry: usize,
        prefix: String,
        reason: String,
    },

    #[error("configuration source {source_name}: {reason}")]
    ConfigurationSource { source_name: String, reason: String },

    #[error("failed to re-execute {program}: {source}")]
    Restart {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FilegenError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn generation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Generation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Both a missing generator and a missing file are "not found" to callers.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::NoGenerator(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::ConfigurationSource { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_kinds() {
        assert!(FilegenError::NotFound("/etc/missing".into()).is_not_found());
        assert!(FilegenError::NoGenerator("/nowhere".into()).is_not_found());
        assert!(!FilegenError::generation("/x", "boom").is_not_found());
    }

    #[test]
    fn test_configuration_display_names_entry() {
        let err = FilegenError::Configuration {
            entry: 3,
            prefix: "/etc".into(),
            reason: "missing field `path`".into(),
        };
        assert!(err.is_configuration());
        assert_eq!(
            err.to_string(),
            "configuration entry 3 (prefix /etc): missing field `path`"
        );
    }
}

//! Reads the generator configuration file into registrations.
//!
//! ```toml
//! [[generator]]
//! prefix = "/etc"
//! kind = "directory"
//! path = "/srv/files/etc"
//!
//! [[generator]]
//! prefix = "/etc/hostname"
//! kind = "programme"
//! program = "/usr/local/bin/hostname-for"
//! args = ["--short"]
//! seconds_valid = 300
//! ```
//!
//! Entries are parsed and built in full before anything is registered; the
//! whole batch then goes into the [`Manager`] in one swap.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::computed::ComputedGenerator;
use crate::error::{FilegenError, Result};
use crate::registry::{directory_family, Manager, StagedRegistration};
use crate::request::normalize_path;
use crate::static_tree::StaticTreeGenerator;

/// Kind-specific parameters of a generator entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GeneratorKind {
    /// Every file below `path`.
    Directory { path: PathBuf },

    /// One file served at exactly the prefix.
    File { path: PathBuf },

    /// A command whose stdout is the content.
    Programme {
        program: PathBuf,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        seconds_valid: Option<u64>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorEntry {
    pub prefix: String,
    pub kind: GeneratorKind,
}

/// Every entry from one read of the configuration file, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationSnapshot {
    pub entries: Vec<GeneratorEntry>,
}

impl ConfigurationSnapshot {
    /// Parse configuration text. Relative paths are kept as written.
    pub fn parse(source: &str) -> Result<Self> {
        Self::parse_with_base(source, None, "<string>")
    }

    /// Read and parse a configuration file.
    ///
    /// Relative paths inside it resolve against the file's directory.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| FilegenError::io(path, e))?;
        Self::parse_with_base(&source, path.parent(), &path.display().to_string())
    }

    pub fn parse_with_base(source: &str, base: Option<&Path>, source_name: &str) -> Result<Self> {
        let document: toml::Table =
            toml::from_str(source).map_err(|e| FilegenError::ConfigurationSource {
                source_name: source_name.to_string(),
                reason: e.to_string(),
            })?;

        let items = match document.get("generator") {
            None => return Ok(Self::default()),
            Some(toml::Value::Array(items)) => items,
            Some(_) => {
                return Err(FilegenError::ConfigurationSource {
                    source_name: source_name.to_string(),
                    reason: "`generator` must be an array of tables".to_string(),
                })
            }
        };

        let mut entries = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let mut entry = parse_entry(index + 1, item)?;
            if let Some(base) = base {
                entry.kind = entry.kind.resolved_against(base);
            }
            entries.push(entry);
        }

        debug!(source = source_name, entries = entries.len(), "parsed generator configuration");
        Ok(Self { entries })
    }

    /// Construct the generators for every entry without registering any.
    pub fn build(&self) -> Result<Vec<StagedRegistration>> {
        let mut batch = Vec::new();
        for (index, entry) in self.entries.iter().enumerate() {
            let invalid = |reason: String| FilegenError::Configuration {
                entry: index + 1,
                prefix: entry.prefix.clone(),
                reason,
            };

            match &entry.kind {
                GeneratorKind::Directory { path } => {
                    let family =
                        directory_family(path, &entry.prefix).map_err(|e| invalid(e.to_string()))?;
                    batch.extend(family);
                }
                GeneratorKind::File { path } => {
                    let metadata = std::fs::metadata(path)
                        .map_err(|e| invalid(format!("{}: {}", path.display(), e)))?;
                    if !metadata.is_file() {
                        return Err(invalid(format!("{} is not a regular file", path.display())));
                    }
                    let generator = StaticTreeGenerator::new(path, &entry.prefix)
                        .map_err(|e| invalid(e.to_string()))?;
                    batch.push(StagedRegistration::explicit(entry.prefix.clone(), Arc::new(generator)));
                }
                GeneratorKind::Programme {
                    program,
                    args,
                    seconds_valid,
                    timeout_secs,
                } => {
                    let mut generator = ComputedGenerator::new(program).with_args(args.clone());
                    if let Some(seconds) = seconds_valid {
                        generator = generator.with_seconds_valid(*seconds);
                    }
                    if let Some(seconds) = timeout_secs {
                        generator = generator.with_timeout(Duration::from_secs(*seconds));
                    }
                    batch.push(StagedRegistration::explicit(entry.prefix.clone(), Arc::new(generator)));
                }
            }
        }
        Ok(batch)
    }

    /// Build every generator, then register them all at once.
    ///
    /// Returns the number of registrations added.
    pub fn apply(&self, manager: &Manager) -> Result<usize> {
        let batch = self.build()?;
        let count = batch.len();
        manager.register_all(batch);
        Ok(count)
    }
}

impl GeneratorKind {
    fn resolved_against(self, base: &Path) -> Self {
        let resolve = |path: PathBuf| {
            if path.is_relative() {
                base.join(path)
            } else {
                path
            }
        };
        match self {
            Self::Directory { path } => Self::Directory { path: resolve(path) },
            Self::File { path } => Self::File { path: resolve(path) },
            Self::Programme {
                program,
                args,
                seconds_valid,
                timeout_secs,
            } => {
                // A bare name is looked up on PATH.
                let program = if program.components().count() > 1 {
                    resolve(program)
                } else {
                    program
                };
                Self::Programme {
                    program,
                    args,
                    seconds_valid,
                    timeout_secs,
                }
            }
        }
    }
}

fn parse_entry(entry: usize, item: &toml::Value) -> Result<GeneratorEntry> {
    let raw_prefix = item
        .get("prefix")
        .and_then(toml::Value::as_str)
        .unwrap_or("")
        .to_string();
    let invalid = |reason: String| FilegenError::Configuration {
        entry,
        prefix: if raw_prefix.is_empty() {
            "<none>".to_string()
        } else {
            raw_prefix.clone()
        },
        reason,
    };

    if !item.is_table() {
        return Err(invalid("entry is not a table".to_string()));
    }
    if raw_prefix.is_empty() {
        return Err(invalid("missing string field `prefix`".to_string()));
    }
    if !raw_prefix.starts_with('/') {
        return Err(invalid("prefix must be absolute".to_string()));
    }

    let kind: GeneratorKind = item
        .clone()
        .try_into()
        .map_err(|e: toml::de::Error| invalid(e.message().to_string()))?;

    Ok(GeneratorEntry {
        prefix: normalize_path(&raw_prefix),
        kind,
    })
}

/// Load a configuration file into `manager`.
///
/// On error nothing is registered.
pub fn load(path: impl AsRef<Path>, manager: &Manager) -> Result<usize> {
    let path = path.as_ref();
    let snapshot = ConfigurationSnapshot::read(path)?;
    let count = snapshot.apply(manager)?;
    info!(config = %path.display(), entries = snapshot.entries.len(), registrations = count, "loaded generator configuration");
    Ok(count)
}

/// Load configuration text into `manager`.
pub fn load_str(source: &str, manager: &Manager) -> Result<usize> {
    ConfigurationSnapshot::parse(source)?.apply(manager)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_all_kinds() {
        let snapshot = ConfigurationSnapshot::parse(
            r#"
            [[generator]]
            prefix = "/etc/"
            kind = "directory"
            path = "/srv/files/etc"

            [[generator]]
            prefix = "/motd"
            kind = "file"
            path = "/srv/motd"

            [[generator]]
            prefix = "/etc/hostname"
            kind = "programme"
            program = "/usr/local/bin/hostname-for"
            args = ["--short"]
            seconds_valid = 300
            owner = "ignored"
            "#,
        )
        .unwrap();

        assert_eq!(
            snapshot.entries,
            vec![
                GeneratorEntry {
                    prefix: "/etc".into(),
                    kind: GeneratorKind::Directory {
                        path: "/srv/files/etc".into()
                    },
                },
                GeneratorEntry {
                    prefix: "/motd".into(),
                    kind: GeneratorKind::File {
                        path: "/srv/motd".into()
                    },
                },
                GeneratorEntry {
                    prefix: "/etc/hostname".into(),
                    kind: GeneratorKind::Programme {
                        program: "/usr/local/bin/hostname-for".into(),
                        args: vec!["--short".into()],
                        seconds_valid: Some(300),
                        timeout_secs: None,
                    },
                },
            ]
        );
    }

    #[test]
    fn test_empty_configuration() {
        assert!(ConfigurationSnapshot::parse("").unwrap().entries.is_empty());
    }

    #[test]
    fn test_unknown_kind_names_entry() {
        let err = ConfigurationSnapshot::parse(
            r#"
            [[generator]]
            prefix = "/a"
            kind = "directory"
            path = "/tmp"

            [[generator]]
            prefix = "/b"
            kind = "template"
            "#,
        )
        .unwrap_err();

        match err {
            FilegenError::Configuration { entry, prefix, .. } => {
                assert_eq!(entry, 2);
                assert_eq!(prefix, "/b");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_field_names_entry() {
        let err = ConfigurationSnapshot::parse(
            r#"
            [[generator]]
            prefix = "/a"
            kind = "programme"
            "#,
        )
        .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().starts_with("configuration entry 1 (prefix /a)"));
        assert!(err.to_string().contains("program"));
    }

    #[test]
    fn test_relative_prefix_is_rejected() {
        let err = ConfigurationSnapshot::parse(
            r#"
            [[generator]]
            prefix = "etc"
            kind = "directory"
            path = "/tmp"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, FilegenError::Configuration { entry: 1, .. }));
    }

    #[test]
    fn test_syntax_error_is_source_error() {
        let err = ConfigurationSnapshot::parse("[[generator]\nprefix =").unwrap_err();
        assert!(matches!(err, FilegenError::ConfigurationSource { .. }));
    }

    #[test]
    fn test_relative_paths_resolve_against_file() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("tree")).unwrap();
        let config = dir.path().join("generators.toml");
        std::fs::write(
            &config,
            r#"
            [[generator]]
            prefix = "/"
            kind = "directory"
            path = "tree"

            [[generator]]
            prefix = "/date"
            kind = "programme"
            program = "date"
            "#,
        )
        .unwrap();

        let snapshot = ConfigurationSnapshot::read(&config).unwrap();
        assert_eq!(
            snapshot.entries[0].kind,
            GeneratorKind::Directory {
                path: dir.path().join("tree")
            }
        );
        match &snapshot.entries[1].kind {
            GeneratorKind::Programme { program, .. } => assert_eq!(program, Path::new("date")),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn test_failed_build_registers_nothing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("motd"), b"hello\n").unwrap();
        let manager = Manager::new();

        let source = format!(
            r#"
            [[generator]]
            prefix = "/"
            kind = "directory"
            path = "{}"

            [[generator]]
            prefix = "/gone"
            kind = "directory"
            path = "{}"
            "#,
            dir.path().display(),
            dir.path().join("absent").display(),
        );

        let err = load_str(&source, &manager).unwrap_err();
        assert!(matches!(err, FilegenError::Configuration { entry: 2, .. }));
        assert!(manager.is_empty());
        assert_eq!(manager.generation(), 0);
    }

    #[test]
    fn test_file_kind_requires_regular_file() {
        let dir = TempDir::new().unwrap();
        let manager = Manager::new();
        let source = format!(
            "[[generator]]\nprefix = \"/motd\"\nkind = \"file\"\npath = \"{}\"\n",
            dir.path().display()
        );
        let err = load_str(&source, &manager).unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }

    #[tokio::test]
    async fn test_load_serves_entries() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("tree/etc")).unwrap();
        std::fs::write(dir.path().join("tree/etc/motd"), b"hello\n").unwrap();
        std::fs::write(dir.path().join("issue"), b"Welcome\n").unwrap();
        let config = dir.path().join("generators.toml");
        std::fs::write(
            &config,
            r#"
            [[generator]]
            prefix = "/"
            kind = "directory"
            path = "tree"

            [[generator]]
            prefix = "/etc/issue"
            kind = "file"
            path = "issue"
            "#,
        )
        .unwrap();

        let manager = Manager::new();
        let count = load(&config, &manager).unwrap();
        assert_eq!(count, 3);

        let request = crate::Request::new("/etc/motd");
        assert_eq!(manager.get_file(&request).await.unwrap().data, b"hello\n");
        let request = crate::Request::new("/etc/issue");
        assert_eq!(manager.get_file(&request).await.unwrap().data, b"Welcome\n");
    }
}

//! Requests and request path normalization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A request for one generated file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Normalized absolute path, e.g. `/etc/motd`.
    pub path: String,

    /// Name of the machine asking, when the caller identifies itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<String>,

    /// Free-form caller metadata passed through to generators.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Request {
    pub fn new(path: &str) -> Self {
        Self {
            path: normalize_path(path),
            ..Default::default()
        }
    }

    pub fn with_machine(mut self, machine: impl Into<String>) -> Self {
        self.machine = Some(machine.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Normalize a request path or mount prefix.
///
/// Always absolute, no empty or `.` components, no trailing slash except for
/// the root itself. `..` components are kept so the generator can reject them.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len() + 1);
    for component in path.split('/') {
        if component.is_empty() || component == "." {
            continue;
        }
        normalized.push('/');
        normalized.push_str(component);
    }
    if normalized.is_empty() {
        normalized.push('/');
    }
    normalized
}

/// The path of `path` below `prefix`, if `prefix` covers it.
///
/// Matching is by whole components: `/etc` covers `/etc` and `/etc/motd`
/// but not `/etcetera`. Both arguments must already be normalized.
pub fn strip_mount<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix == "/" {
        return Some(path.trim_start_matches('/'));
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix('/')
    }
}

//! The generator abstraction.
//!
//! A generator turns a [`Request`] into file bytes. There are two kinds:
//! [`StaticTreeGenerator`](crate::StaticTreeGenerator) serves a directory
//! tree (or a single file) from disk, and
//! [`ComputedGenerator`](crate::ComputedGenerator) runs a command.

use async_trait::async_trait;
use std::time::SystemTime;

use crate::error::Result;
use crate::request::Request;

/// Bytes produced for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub data: Vec<u8>,

    /// After this instant the content should be generated again.
    /// `None` means valid until the generator's inputs change.
    pub valid_until: Option<SystemTime>,
}

impl GeneratedFile {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            valid_until: None,
        }
    }
}

/// Produces file content on demand.
///
/// Implementations are shared between concurrent requests and must not hold
/// per-request state.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn produce(&self, request: &Request) -> Result<GeneratedFile>;

    /// Short name of the generator kind for status pages.
    fn kind(&self) -> &'static str;

    /// Human-readable summary for status pages.
    fn describe(&self) -> String {
        String::new()
    }
}

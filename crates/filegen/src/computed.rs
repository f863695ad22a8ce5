//! Generates content by running a command.
//!
//! The command receives the request as JSON on stdin:
//!
//! ```json
//! {"path": "/etc/hostname", "machine": "web01", "metadata": {"role": "frontend"}}
//! ```
//!
//! and whatever it writes to stdout is the file. A non-zero exit status is a
//! generation failure; stderr is included in the error.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{FilegenError, Result};
use crate::generator::{GeneratedFile, Generator};
use crate::request::Request;

/// Longest stderr excerpt carried in an error.
const STDERR_EXCERPT: usize = 512;

#[derive(Debug, Clone)]
pub struct ComputedGenerator {
    program: PathBuf,
    args: Vec<String>,
    seconds_valid: Option<u64>,
    timeout: Option<Duration>,
}

impl ComputedGenerator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            seconds_valid: None,
            timeout: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Mark output as stale this many seconds after it was produced.
    pub fn with_seconds_valid(mut self, seconds: u64) -> Self {
        self.seconds_valid = Some(seconds);
        self
    }

    /// Kill the command if it runs longer than this.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn run(&self, request: &Request) -> Result<Vec<u8>> {
        let input = serde_json::to_vec(request)
            .map_err(|e| FilegenError::generation(&request.path, e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                FilegenError::generation(
                    &request.path,
                    format!("failed to start {}: {}", self.program.display(), e),
                )
            })?;

        // Feed stdin while waiting so a command that never reads it cannot
        // block us past the timeout.
        let stdin = child.stdin.take();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(&input).await {
                Ok(()) => Ok(()),
                // Commands that ignore stdin may exit before reading it.
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                Err(e) => Err(e),
            }
        };
        let exchange = async {
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            fed?;
            output
        };

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| {
                    FilegenError::generation(
                        &request.path,
                        format!("{} timed out after {:?}", self.program.display(), limit),
                    )
                })?,
            None => exchange.await,
        }
        .map_err(|e| FilegenError::generation(&request.path, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.trim().chars().take(STDERR_EXCERPT).collect();
            warn!(path = %request.path, program = %self.program.display(), status = %output.status, "generator command failed");
            return Err(FilegenError::generation(
                &request.path,
                format!("{} exited with {}: {}", self.program.display(), output.status, excerpt),
            ));
        }

        debug!(path = %request.path, bytes = output.stdout.len(), "generator command finished");
        Ok(output.stdout)
    }
}

#[async_trait]
impl Generator for ComputedGenerator {
    async fn produce(&self, request: &Request) -> Result<GeneratedFile> {
        let data = self.run(request).await?;
        let valid_until = self
            .seconds_valid
            .map(|seconds| SystemTime::now() + Duration::from_secs(seconds));
        Ok(GeneratedFile { data, valid_until })
    }

    fn kind(&self) -> &'static str {
        "computed"
    }

    fn describe(&self) -> String {
        let mut summary = self.program.display().to_string();
        for arg in &self.args {
            summary.push(' ');
            summary.push_str(arg);
        }
        if let Some(seconds) = self.seconds_valid {
            summary.push_str(&format!(" (valid {}s)", seconds));
        }
        summary
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ComputedGenerator {
        ComputedGenerator::new("/bin/sh").with_args(vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_stdout_is_content() {
        let generator = sh("printf 'generated\\n'");
        let file = generator.produce(&Request::new("/etc/issue")).await.unwrap();
        assert_eq!(file.data, b"generated\n");
        assert!(file.valid_until.is_none());
    }

    #[tokio::test]
    async fn test_request_is_passed_on_stdin() {
        let generator = sh("cat");
        let request = Request::new("/etc/hostname").with_machine("web01");

        let file = generator.produce(&request).await.unwrap();
        let echoed: Request = serde_json::from_slice(&file.data).unwrap();
        assert_eq!(echoed, request);
    }

    #[tokio::test]
    async fn test_failure_is_generation_error() {
        let generator = sh("echo broken >&2; exit 3");
        let err = generator.produce(&Request::new("/x")).await.unwrap_err();
        match err {
            FilegenError::Generation { path, reason } => {
                assert_eq!(path, "/x");
                assert!(reason.contains("broken"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_generation_error() {
        let generator = ComputedGenerator::new("/nonexistent/filegen/program");
        let err = generator.produce(&Request::new("/x")).await.unwrap_err();
        assert!(matches!(err, FilegenError::Generation { .. }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let generator = sh("sleep 5").with_timeout(Duration::from_millis(100));
        let err = generator.produce(&Request::new("/slow")).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_timeout_covers_unread_stdin() {
        // Far larger than a pipe buffer, and never read.
        let request = Request::new("/big").with_metadata("blob", "x".repeat(1 << 20));
        let generator = sh("sleep 30").with_timeout(Duration::from_millis(300));

        let result = tokio::time::timeout(Duration::from_secs(10), generator.produce(&request))
            .await
            .expect("timeout did not cover the stdin write");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err}");
    }

    #[tokio::test]
    async fn test_large_request_is_read_in_full() {
        let request = Request::new("/big").with_metadata("blob", "x".repeat(1 << 20));
        let file = sh("wc -c").produce(&request).await.unwrap();
        let count: usize = String::from_utf8(file.data).unwrap().trim().parse().unwrap();
        assert_eq!(count, serde_json::to_vec(&request).unwrap().len());
    }

    #[tokio::test]
    async fn test_seconds_valid_sets_expiry() {
        let generator = sh("true").with_seconds_valid(60);
        let before = SystemTime::now();
        let file = generator.produce(&Request::new("/x")).await.unwrap();
        let valid_until = file.valid_until.unwrap();
        assert!(valid_until >= before + Duration::from_secs(60));
    }

    #[test]
    fn test_describe() {
        let generator = sh("date").with_seconds_valid(10);
        assert_eq!(generator.describe(), "/bin/sh -c date (valid 10s)");
        assert_eq!(generator.kind(), "computed");
    }
}

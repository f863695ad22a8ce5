//! Precedence between the generator configuration and directories given on
//! the command line.

#![cfg(unix)]

use filegen::{FilegenError, Manager, ReloadSupervisor, Request, Restarter};
use filegen_server::start_generators;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct NoRestart;

impl Restarter for NoRestart {
    fn restart(&self) -> filegen::Result<()> {
        Err(FilegenError::Restart {
            program: PathBuf::from("filegen-server"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "restarts disabled"),
        })
    }
}

struct Setup {
    _config_dir: TempDir,
    tree: TempDir,
    supervisor: Arc<ReloadSupervisor>,
}

fn setup() -> Setup {
    let config_dir = TempDir::new().unwrap();
    let config = config_dir.path().join("generators.toml");
    fs::write(
        &config,
        r#"
        [[generator]]
        prefix = "/etc"
        kind = "programme"
        program = "/bin/sh"
        args = ["-c", "printf configured"]
        "#,
    )
    .unwrap();

    let tree = TempDir::new().unwrap();
    fs::create_dir_all(tree.path().join("etc")).unwrap();
    fs::write(tree.path().join("etc/motd"), b"from tree\n").unwrap();

    let supervisor = Arc::new(ReloadSupervisor::new(
        &config,
        Duration::from_secs(60),
        Box::new(NoRestart),
    ));
    Setup {
        _config_dir: config_dir,
        tree,
        supervisor,
    }
}

async fn fetch(manager: &Manager, path: &str) -> Vec<u8> {
    manager.get_file(&Request::new(path)).await.unwrap().data
}

#[tokio::test]
async fn directory_files_present_at_startup_beat_configuration() {
    let setup = setup();
    let manager = Manager::new();

    let watcher = start_generators(
        &manager,
        Some(&setup.supervisor),
        false,
        &[setup.tree.path().to_path_buf()],
    )
    .unwrap();

    assert_eq!(fetch(&manager, "/etc/motd").await, b"from tree\n");
    watcher.unwrap().abort();
}

#[tokio::test]
async fn files_added_to_directory_later_fall_to_configuration() {
    let setup = setup();
    let manager = Manager::new();

    let watcher = start_generators(
        &manager,
        Some(&setup.supervisor),
        false,
        &[setup.tree.path().to_path_buf()],
    )
    .unwrap();
    fs::write(setup.tree.path().join("etc/issue"), b"Welcome\n").unwrap();

    assert_eq!(fetch(&manager, "/etc/issue").await, b"configured");
    watcher.unwrap().abort();
}

#[tokio::test]
async fn configuration_alone_serves_its_prefix() {
    let setup = setup();
    let manager = Manager::new();

    let watcher = start_generators(&manager, Some(&setup.supervisor), false, &[]).unwrap();

    assert_eq!(fetch(&manager, "/etc/motd").await, b"configured");
    watcher.unwrap().abort();
}

#[tokio::test]
async fn directories_without_configuration() {
    let setup = setup();
    let manager = Manager::new();

    let watcher = start_generators(&manager, None, false, &[setup.tree.path().to_path_buf()]).unwrap();

    assert!(watcher.is_none());
    assert_eq!(fetch(&manager, "/etc/motd").await, b"from tree\n");
}

#[tokio::test]
async fn failed_configuration_stops_startup() {
    let setup = setup();
    fs::write(setup.supervisor.config_path(), "[[generator]]\nprefix = 3\n").unwrap();
    let manager = Manager::new();

    let result = start_generators(
        &manager,
        Some(&setup.supervisor),
        false,
        &[setup.tree.path().to_path_buf()],
    );

    assert!(result.is_err());
    assert!(manager.is_empty());
}

//! Router tests driven through `tower::ServiceExt::oneshot`.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request as HttpRequest, StatusCode};
use axum::Router;
use filegen::{Manager, ReloadSupervisor, Restarter};
use filegen_server::{router, AppState};
use objectcache::{Digest, ObjectCache};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

struct Fixture {
    files: TempDir,
    _cache: TempDir,
    manager: Arc<Manager>,
    app: Router,
}

fn fixture() -> Fixture {
    let files = TempDir::new().unwrap();
    std::fs::create_dir_all(files.path().join("etc")).unwrap();
    std::fs::write(files.path().join("etc/motd"), b"hello\n").unwrap();

    let cache_dir = TempDir::new().unwrap();
    let cache = Arc::new(ObjectCache::at_path(cache_dir.path()).unwrap());
    let manager = Arc::new(Manager::new());
    manager.register_directory(files.path(), "/").unwrap();

    let app = router(AppState::new(Arc::clone(&manager), cache));
    Fixture {
        files,
        _cache: cache_dir,
        manager,
        app,
    }
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(HttpRequest::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn serves_file() {
    let fixture = fixture();
    let response = fixture
        .app
        .clone()
        .oneshot(HttpRequest::get("/files/etc/motd").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"hello\n");
}

#[tokio::test]
async fn missing_file_is_404() {
    let fixture = fixture();
    let (status, _) = get(&fixture.app, "/files/etc/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn path_escape_is_404() {
    let fixture = fixture();
    let (status, _) = get(&fixture.app, "/files/etc/%2E%2E/%2E%2E/etc/passwd").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unregistered_path_is_404() {
    let files = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let cache = Arc::new(ObjectCache::at_path(cache_dir.path()).unwrap());
    let manager = Arc::new(Manager::new());
    manager.register_directory(files.path(), "/srv").unwrap();
    let app = router(AppState::new(manager, cache));

    let (status, _) = get(&app, "/files/etc/motd").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[cfg(unix)]
#[tokio::test]
async fn generation_failure_is_500() {
    let fixture = fixture();
    fixture.manager.register(
        "/broken",
        Arc::new(
            filegen::ComputedGenerator::new("/bin/sh")
                .with_args(vec!["-c".to_string(), "exit 1".to_string()]),
        ),
    );

    let (status, _) = get(&fixture.app, "/files/broken").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[cfg(unix)]
#[tokio::test]
async fn machine_header_reaches_generator() {
    let fixture = fixture();
    fixture.manager.register(
        "/whoami",
        Arc::new(filegen::ComputedGenerator::new("/bin/cat")),
    );

    let response = fixture
        .app
        .clone()
        .oneshot(
            HttpRequest::get("/files/whoami?role=frontend")
                .header("X-Filegen-Machine", "web01")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let request: filegen::Request = serde_json::from_slice(&body).unwrap();
    assert_eq!(request.path, "/whoami");
    assert_eq!(request.machine.as_deref(), Some("web01"));
    assert_eq!(request.metadata["role"], "frontend");
}

#[tokio::test]
async fn hash_then_object() {
    let fixture = fixture();

    let (status, body) = get(&fixture.app, "/hashes/etc/motd").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let expected = Digest::from_data(b"hello\n").to_hex();
    assert_eq!(json["hash"], expected.as_str());
    assert_eq!(json["size"], 6);
    assert_eq!(json["path"], "/etc/motd");

    // The generated source stays in place.
    assert!(fixture.files.path().join("etc/motd").exists());

    let (status, body) = get(&fixture.app, &format!("/objects/{expected}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"hello\n");
}

#[tokio::test]
async fn unknown_and_invalid_objects() {
    let fixture = fixture();

    let absent = Digest::from_data(b"never stored").to_hex();
    let (status, _) = get(&fixture.app, &format!("/objects/{absent}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&fixture.app, "/objects/not-a-hash").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_lists_registrations() {
    let fixture = fixture();
    let (status, body) = get(&fixture.app, "/status").await;
    assert_eq!(status, StatusCode::OK);

    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("/etc/motd"));
    assert!(html.contains("static-tree"));
}

#[tokio::test]
async fn status_escapes_configuration_path() {
    struct NoRestart;
    impl Restarter for NoRestart {
        fn restart(&self) -> filegen::Result<()> {
            Ok(())
        }
    }

    let fixture = fixture();
    let supervisor = Arc::new(ReloadSupervisor::new(
        "/srv/<script>alert(1)</script>&/generators.toml",
        Duration::from_secs(60),
        Box::new(NoRestart),
    ));
    let cache_dir = TempDir::new().unwrap();
    let cache = Arc::new(ObjectCache::at_path(cache_dir.path()).unwrap());
    let app = router(AppState::new(Arc::clone(&fixture.manager), cache).with_supervisor(supervisor));

    let (status, body) = get(&app, "/status").await;
    assert_eq!(status, StatusCode::OK);

    let html = String::from_utf8(body).unwrap();
    assert!(!html.contains("<script>"), "{html}");
    assert!(html.contains("/srv/&lt;script&gt;alert(1)&lt;/script&gt;&amp;/generators.toml"));
}

#[tokio::test]
async fn health_reports_registry() {
    let fixture = fixture();
    let (status, body) = get(&fixture.app, "/health").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["registrations"], 2);
    assert_eq!(json["generation"], 1);
    assert!(json["reload"].is_null());
}

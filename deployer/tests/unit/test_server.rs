//! HTTP adapter tests

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use vm_deployer::deploy::executor::ProcessExecutor;
use vm_deployer::deploy::pipeline::Deployer;
use vm_deployer::deploy::stager::{BundleSource, BundleStager};
use vm_deployer::secrets::memory::MemorySecrets;
use vm_deployer::server::serve::router;
use vm_deployer::server::state::ServerState;
use vm_deployer::storage::settings::Settings;

fn app(tmp: &tempfile::TempDir, secrets: Arc<MemorySecrets>) -> Router {
    let mut settings = Settings::default();
    settings.workspace_root = Some(tmp.path().join("work"));
    let stager = BundleStager::new(BundleSource::Archive(tmp.path().join("missing.zip"))).unwrap();
    let executor = ProcessExecutor::new(&settings.ansible);
    let deployer = Deployer::new(Arc::new(settings), secrets, stager, executor);
    router(Arc::new(ServerState::new(Arc::new(deployer))))
}

async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post_deploy(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/deploy")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_and_version() {
    let tmp = tempfile::tempdir().unwrap();
    let secrets = Arc::new(MemorySecrets::new("demoapp/vm"));

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = call(app(&tmp, secrets.clone()), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "vm-deployer");

    let request = Request::builder().uri("/version").body(Body::empty()).unwrap();
    let (status, body) = call(app(&tmp, secrets), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["git_hash"].is_string());
}

#[tokio::test]
async fn test_deploy_rejects_bad_requests() {
    let tmp = tempfile::tempdir().unwrap();
    let secrets = Arc::new(MemorySecrets::new("demoapp/vm"));

    let (status, body) = call(
        app(&tmp, secrets.clone()),
        post_deploy(r#"{"jar_timestamp": "t1"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "service_name and jar_timestamp required"}));

    let (status, body) = call(app(&tmp, secrets.clone()), post_deploy("{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid JSON"));

    let (status, _) = call(app(&tmp, secrets.clone()), post_deploy("")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(secrets.call_count(), 0);
}

#[tokio::test]
async fn test_deploy_reports_pipeline_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let secrets = Arc::new(MemorySecrets::new("demoapp/vm"));

    let (status, body) = call(
        app(&tmp, secrets.clone()),
        post_deploy(r#"{"service_name": "svc1", "jar_timestamp": "t1", "site": "sit9"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("demoapp/vm/sit9"));
    assert_eq!(body["stdout_tail"], "");
    assert_eq!(body["stderr_tail"], "");
    assert!(secrets.call_count() >= 1);
    assert_eq!(std::fs::read_dir(tmp.path().join("work")).unwrap().count(), 0);
}

#[tokio::test]
async fn test_unknown_route() {
    let tmp = tempfile::tempdir().unwrap();
    let response = app(&tmp, Arc::new(MemorySecrets::new("demoapp/vm")))
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{extract::State, routing::post, Json, Router};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use zonewatch::config::types::EdgeConfig;
use zonewatch::edge::{server, sweep, EdgeState, FsRetryStore, RetryStore};

#[derive(Clone)]
struct Backend {
    fail: Arc<AtomicBool>,
    received: Arc<Mutex<Vec<String>>>,
}

async fn backend_handler(State(backend): State<Backend>, body: String) -> axum::response::Response {
    if backend.fail.load(Ordering::SeqCst) {
        (StatusCode::INTERNAL_SERVER_ERROR, "backend down").into_response()
    } else {
        backend.received.lock().unwrap().push(body);
        Json(serde_json::json!({ "ok": true })).into_response()
    }
}

/// Mock backend whose availability is toggled by the test.
async fn spawn_backend() -> (String, Backend) {
    let backend = Backend {
        fail: Arc::new(AtomicBool::new(false)),
        received: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/exec", post(backend_handler))
        .with_state(backend.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/exec", addr), backend)
}

fn edge_config(backend_url: Option<String>, queue_dir: &Path) -> EdgeConfig {
    EdgeConfig {
        listen: "127.0.0.1:0".to_string(),
        backend_url,
        client_secret: None,
        backend_secret: Some("backend-secret".to_string()),
        admin_token: Some("admin-token".to_string()),
        queue_dir: queue_dir.to_path_buf(),
        sweep_interval_secs: 60,
        diag_default: false,
        timeout_secs: 5,
    }
}

fn edge_state(config: EdgeConfig) -> (Arc<EdgeState>, Arc<dyn RetryStore>) {
    let store: Arc<dyn RetryStore> =
        Arc::new(FsRetryStore::new(config.queue_dir.clone()).unwrap());
    (
        Arc::new(EdgeState::new(config, store.clone()).unwrap()),
        store,
    )
}

async fn spawn_edge(state: Arc<EdgeState>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, server::app(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_backend_failure_queues_then_sweep_redelivers_once() {
    let (backend_url, backend) = spawn_backend().await;
    backend.fail.store(true, Ordering::SeqCst);

    let queue = TempDir::new().unwrap();
    let (state, store) = edge_state(edge_config(Some(backend_url), queue.path()));
    let edge_url = spawn_edge(state.clone()).await;

    let body = r#"{"mode":"directImport","blob":{"zoneTab":"Zones","latest":{}}}"#;
    let response = reqwest::Client::new()
        .post(format!("{}/ingest", edge_url))
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["ok"], true);
    assert_eq!(json["queued"], true);
    assert_eq!(store.list_keys().await.unwrap().len(), 1);

    // Backend comes back; one sweep drains the queue exactly once.
    backend.fail.store(false, Ordering::SeqCst);
    assert_eq!(sweep::sweep_once(&state).await, 1);
    assert!(store.list_keys().await.unwrap().is_empty());
    {
        let received = backend.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0], body);
    }

    assert_eq!(sweep::sweep_once(&state).await, 0);
    assert_eq!(backend.received.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_sweep_purges_invalid_entries_without_delivering() {
    let (backend_url, backend) = spawn_backend().await;
    let queue = TempDir::new().unwrap();
    let (state, store) = edge_state(edge_config(Some(backend_url), queue.path()));

    std::fs::write(
        queue.path().join("q-0000000000001-garbage.json"),
        "not json at all",
    )
    .unwrap();
    std::fs::write(
        queue.path().join("q-0000000000002-hollow.json"),
        r#"{"target":"","body":"","enqueuedAt":""}"#,
    )
    .unwrap();

    assert_eq!(sweep::sweep_once(&state).await, 0);
    assert!(store.list_keys().await.unwrap().is_empty());
    assert!(backend.received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_client_secret_gates_ingest() {
    let (backend_url, backend) = spawn_backend().await;
    let queue = TempDir::new().unwrap();
    let mut config = edge_config(Some(backend_url), queue.path());
    config.client_secret = Some("hush".to_string());
    let (state, _store) = edge_state(config);
    let edge_url = spawn_edge(state).await;

    let client = reqwest::Client::new();
    let denied = client
        .post(format!("{}/ingest", edge_url))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status().as_u16(), 403);
    let json: serde_json::Value = denied.json().await.unwrap();
    assert_eq!(json["ok"], false);
    assert!(backend.received.lock().unwrap().is_empty());

    let allowed = client
        .post(format!("{}/ingest", edge_url))
        .header("x-auth", "hush")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status().as_u16(), 200);
    assert_eq!(backend.received.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_destination_resolution_and_validation() {
    let (backend_url, backend) = spawn_backend().await;
    let queue = TempDir::new().unwrap();
    // No configured backend: each request must carry its own destination.
    let (state, _store) = edge_state(edge_config(None, queue.path()));
    let edge_url = spawn_edge(state).await;

    let client = reqwest::Client::new();
    let missing = client
        .post(format!("{}/ingest", edge_url))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status().as_u16(), 501);

    let invalid = client
        .post(format!("{}/ingest", edge_url))
        .body(r#"{"targetUrl":"ftp://example.com/exec"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status().as_u16(), 400);

    let proxied = client
        .post(format!("{}/ingest", edge_url))
        .body(format!(r#"{{"targetUrl":"{}"}}"#, backend_url))
        .send()
        .await
        .unwrap();
    assert_eq!(proxied.status().as_u16(), 200);
    assert_eq!(
        proxied
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    let json: serde_json::Value = proxied.json().await.unwrap();
    assert_eq!(json["ok"], true);
    assert_eq!(backend.received.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_diag_toggle_requires_admin_token_and_persists() {
    let (backend_url, _backend) = spawn_backend().await;
    let queue = TempDir::new().unwrap();
    let (state, _store) = edge_state(edge_config(Some(backend_url), queue.path()));
    let edge_url = spawn_edge(state).await;

    let client = reqwest::Client::new();
    let status: serde_json::Value = client
        .get(format!("{}/diag", edge_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["diagEnabled"], false);
    assert_eq!(status["queued"], 0);

    let denied = client
        .post(format!("{}/diag?on=1", edge_url))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status().as_u16(), 403);

    let toggled: serde_json::Value = client
        .post(format!("{}/diag?on=1", edge_url))
        .header("x-admin", "admin-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(toggled["diagEnabled"], true);

    // The persisted flag wins over the static default on later reads.
    let status: serde_json::Value = client
        .get(format!("{}/diag", edge_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["diagEnabled"], true);

    let toggled: serde_json::Value = client
        .post(format!("{}/diag?off=1", edge_url))
        .header("x-admin", "admin-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(toggled["diagEnabled"], false);
}

use axum::{extract::State, routing::post, Json, Router};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use zonewatch::config::types::{Config, EndpointConfig, StateConfig, WatchConfig};
use zonewatch::watch::Coordinator;

type Received = Arc<Mutex<Vec<serde_json::Value>>>;

async fn record(
    State(received): State<Received>,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    received.lock().unwrap().push(body);
    Json(serde_json::json!({ "ok": true }))
}

/// Accepting mock backend on an ephemeral port; captures every envelope.
async fn spawn_backend() -> (String, Received) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/ingest", post(record))
        .with_state(received.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/ingest", addr), received)
}

fn test_config(url: &str, log_dir: &Path, snapshot: &Path) -> Config {
    Config {
        endpoint: EndpointConfig {
            url: url.to_string(),
            shared_secret: None,
            destination_tab: "Zones".to_string(),
            timeout_secs: 5,
        },
        watch: WatchConfig {
            log_dir: log_dir.to_path_buf(),
            base_dir: None,
            debounce_ms: 10,
            scan_interval_secs: 0,
        },
        state: StateConfig {
            snapshot_path: Some(snapshot.to_path_buf()),
        },
        edge: None,
    }
}

fn append_lines(path: &Path, lines: &[&str]) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file.flush().unwrap();
}

#[tokio::test]
async fn test_zone_change_flows_from_log_to_backend() {
    let (url, received) = spawn_backend().await;
    let logs = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();

    let log_path: PathBuf = logs.path().join("eqlog_Vanidor_p99.txt");
    append_lines(
        &log_path,
        &[
            "[Mon Jan 01 10:15:18 2024] You say, 'heading out'",
            "[Mon Jan 01 10:15:20 2024] You have entered The Estate of Unrest.",
        ],
    );

    let config = test_config(&url, logs.path(), &state.path().join("snapshot.json"));
    let mut coordinator = Coordinator::new(&config).unwrap();
    coordinator.initial_cycle().await.unwrap();

    {
        let envelopes = received.lock().unwrap();
        assert_eq!(envelopes.len(), 1);
        let envelope = &envelopes[0];
        assert_eq!(envelope["mode"], "directImport");
        assert_eq!(envelope["blob"]["zoneTab"], "Zones");
        let entry = &envelope["blob"]["latest"]["Vanidor"];
        assert_eq!(entry["zone"], "The Estate of Unrest");
        assert_eq!(entry["detectedTs"], "2024-01-01 10:15:20");
    }

    // An unchanged file stages nothing, so the next cycle stays silent.
    coordinator.periodic_cycle().await;
    assert_eq!(received.lock().unwrap().len(), 1);

    // A bracketless enter line still updates the zone, with an empty stamp.
    append_lines(&log_path, &["You have entered North Freeport."]);
    coordinator.periodic_cycle().await;

    let envelopes = received.lock().unwrap();
    assert_eq!(envelopes.len(), 2);
    let latest = &envelopes[1]["blob"]["latest"];
    assert_eq!(latest.as_object().unwrap().len(), 1);
    assert_eq!(latest["Vanidor"]["zone"], "North Freeport");
    assert_eq!(latest["Vanidor"]["detectedTs"], "");
}

#[tokio::test]
async fn test_restart_resends_restored_snapshot() {
    let (url, received) = spawn_backend().await;
    let logs = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let snapshot = state.path().join("snapshot.json");

    append_lines(
        &logs.path().join("eqlog_Vanidor_p99.txt"),
        &["[Mon Jan 01 10:15:20 2024] You have entered Qeynos."],
    );

    let config = test_config(&url, logs.path(), &snapshot);
    let mut coordinator = Coordinator::new(&config).unwrap();
    coordinator.initial_cycle().await.unwrap();
    assert_eq!(received.lock().unwrap().len(), 1);
    drop(coordinator);

    // Fresh start, unchanged logs: nothing pending, but the restored state
    // goes out as a full snapshot so the backend converges.
    let mut coordinator = Coordinator::new(&config).unwrap();
    coordinator.initial_cycle().await.unwrap();

    let envelopes = received.lock().unwrap();
    assert_eq!(envelopes.len(), 2);
    assert_eq!(
        envelopes[1]["blob"]["latest"]["Vanidor"]["zone"],
        "Qeynos"
    );
}

#[tokio::test]
async fn test_multiple_sources_tracked_independently() {
    let (url, received) = spawn_backend().await;
    let logs = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();

    append_lines(
        &logs.path().join("eqlog_Vanidor_p99.txt"),
        &["[Mon Jan 01 10:15:20 2024] You have entered Qeynos."],
    );
    append_lines(
        &logs.path().join("eqlog_Thara_p99.txt"),
        &["[Mon Jan 01 11:00:00 2024] You have entered Rivervale."],
    );
    append_lines(&logs.path().join("dbg.txt"), &["not a log source"]);

    let config = test_config(&url, logs.path(), &state.path().join("snapshot.json"));
    let mut coordinator = Coordinator::new(&config).unwrap();
    coordinator.initial_cycle().await.unwrap();

    let envelopes = received.lock().unwrap();
    assert_eq!(envelopes.len(), 1);
    let latest = envelopes[0]["blob"]["latest"].as_object().unwrap();
    assert_eq!(latest.len(), 2);
    assert_eq!(latest["Vanidor"]["zone"], "Qeynos");
    assert_eq!(latest["Thara"]["zone"], "Rivervale");
}

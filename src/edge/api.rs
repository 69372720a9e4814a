use crate::config::types::EdgeConfig;
use crate::edge::store::{QueuedRetry, RetryStore};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Shared state for the edge request handlers.
pub struct EdgeState {
    pub config: EdgeConfig,
    pub store: Arc<dyn RetryStore>,
    pub client: reqwest::Client,
}

impl EdgeState {
    pub fn new(config: EdgeConfig, store: Arc<dyn RetryStore>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config,
            store,
            client,
        })
    }

    /// Persisted toggle wins over the static default.
    pub async fn diag_enabled(&self) -> bool {
        match self.store.read_flag("diag").await {
            Ok(Some(value)) => value,
            Ok(None) => self.config.diag_default,
            Err(e) => {
                warn!(error = %e, "diag flag read failed");
                self.config.diag_default
            }
        }
    }
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    let mut response = (status, body.to_string()).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
    apply_cors(headers);
    response
}

fn apply_cors(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", "*".parse().unwrap());
    headers.insert(
        "access-control-allow-headers",
        "content-type,x-auth,x-admin".parse().unwrap(),
    );
    headers.insert(
        "access-control-allow-methods",
        "GET,POST,OPTIONS".parse().unwrap(),
    );
}

/// OPTIONS * — CORS preflight.
pub async fn preflight() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    apply_cors(response.headers_mut());
    response
        .headers_mut()
        .insert("access-control-max-age", "600".parse().unwrap());
    response
}

/// Any GET outside /diag, and unknown paths.
pub async fn help() -> Response {
    json_response(
        StatusCode::OK,
        json!({ "ok": true, "message": "POST JSON to / (or /ingest); GET /diag for status" }),
    )
}

/// POST / and /ingest — forward to the backend, queueing on failure.
pub async fn ingest(
    State(state): State<Arc<EdgeState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Some(expected) = &state.config.client_secret {
        let presented = headers
            .get("x-auth")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != expected {
            return json_response(
                StatusCode::FORBIDDEN,
                json!({ "ok": false, "error": "unauthorized" }),
            );
        }
    }

    let body_json: serde_json::Value = serde_json::from_str(&body).unwrap_or(json!({}));

    let target = resolve_target(&state.config, &body_json);
    let Some(target) = target else {
        return json_response(
            StatusCode::NOT_IMPLEMENTED,
            json!({
                "ok": false,
                "error": "no backend destination; set edge.backend_url or include targetUrl"
            }),
        );
    };
    if !is_http_url(&target) {
        return json_response(
            StatusCode::BAD_REQUEST,
            json!({ "ok": false, "error": "destination is not a valid http(s) URL" }),
        );
    }

    let diag = state.diag_enabled().await;
    if diag {
        info!(target = %target, "forwarding delivery");
    }

    match forward(&state, &target, &body).await {
        Ok(response) if retryable(response.status()) => {
            if diag {
                info!(status = response.status().as_u16(), "backend unavailable, queueing");
            }
            enqueue(&state, target, body).await
        }
        Ok(response) => {
            let status = response.status();
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/json")
                .to_string();
            let text = response.text().await.unwrap_or_default();
            if diag {
                info!(status = status.as_u16(), "backend responded");
            }

            let mut proxied = (
                StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
                text,
            )
                .into_response();
            let headers = proxied.headers_mut();
            if let Ok(value) = content_type.parse() {
                headers.insert(header::CONTENT_TYPE, value);
            }
            apply_cors(headers);
            proxied
        }
        Err(e) => {
            // Transport failure reaching the backend is retryable too.
            warn!(error = %e, "backend unreachable, queueing");
            enqueue(&state, target, body).await
        }
    }
}

fn retryable(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

async fn forward(
    state: &EdgeState,
    target: &str,
    body: &str,
) -> Result<reqwest::Response, reqwest::Error> {
    let mut request = state
        .client
        .post(target)
        .header("Content-Type", "application/json")
        .body(body.to_string());
    if let Some(secret) = &state.config.backend_secret {
        request = request.header("X-Auth", secret);
    }
    request.send().await
}

async fn enqueue(state: &EdgeState, target: String, body: String) -> Response {
    let entry = QueuedRetry::new(target, body);
    match state.store.put(&entry).await {
        Ok(key) => {
            info!(key = %key, "delivery queued for retry");
            json_response(StatusCode::ACCEPTED, json!({ "ok": true, "queued": true }))
        }
        Err(e) => json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "ok": false, "error": format!("queue write failed: {}", e) }),
        ),
    }
}

fn resolve_target(config: &EdgeConfig, body: &serde_json::Value) -> Option<String> {
    if let Some(url) = &config.backend_url {
        let url = url.trim();
        if !url.is_empty() {
            return Some(url.to_string());
        }
    }
    for field in ["targetUrl", "backendUrl"] {
        if let Some(url) = body.get(field).and_then(|v| v.as_str()) {
            let url = url.trim();
            if !url.is_empty() {
                return Some(url.to_string());
            }
        }
    }
    None
}

fn is_http_url(url: &str) -> bool {
    match reqwest::Url::parse(url) {
        Ok(parsed) => {
            (parsed.scheme() == "http" || parsed.scheme() == "https")
                && parsed.host_str().is_some()
        }
        Err(_) => false,
    }
}

/// GET /diag — diagnostics status.
pub async fn diag_status(State(state): State<Arc<EdgeState>>) -> Response {
    let queued = state
        .store
        .list_keys()
        .await
        .map(|keys| keys.len())
        .unwrap_or(0);
    let diag = state.diag_enabled().await;

    json_response(
        StatusCode::OK,
        json!({
            "ok": true,
            "diagEnabled": diag,
            "queued": queued,
            "vars": {
                "has_backend_url": state.config.backend_url.is_some(),
                "has_backend_secret": state.config.backend_secret.is_some(),
                "has_client_secret": state.config.client_secret.is_some(),
                "diag_default": state.config.diag_default,
            }
        }),
    )
}

/// POST /diag?on=1|off=1 — admin-token gated toggle.
pub async fn diag_toggle(
    State(state): State<Arc<EdgeState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let presented = headers
        .get("x-admin")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let authorized = state
        .config
        .admin_token
        .as_deref()
        .map(|token| presented == token)
        .unwrap_or(false);
    if !authorized {
        return json_response(
            StatusCode::FORBIDDEN,
            json!({ "ok": false, "error": "admin token required" }),
        );
    }

    let result = if params.get("on").map(|v| v == "1").unwrap_or(false) {
        state.store.write_flag("diag", true).await
    } else if params.get("off").map(|v| v == "1").unwrap_or(false) {
        state.store.write_flag("diag", false).await
    } else {
        Ok(())
    };
    if let Err(e) = result {
        warn!(error = %e, "diag flag write failed");
    }

    let diag = state.diag_enabled().await;
    json_response(StatusCode::OK, json!({ "ok": true, "diagEnabled": diag }))
}

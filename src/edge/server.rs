use crate::edge::api::{diag_status, diag_toggle, help, ingest, preflight, EdgeState};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub fn app(state: Arc<EdgeState>) -> Router {
    Router::new()
        .route("/", post(ingest).get(help).options(preflight))
        .route("/ingest", post(ingest).options(preflight))
        .route("/diag", get(diag_status).post(diag_toggle).options(preflight))
        .fallback(help)
        .with_state(state)
}

/// Start the edge HTTP server.
pub async fn start_server(
    listen_addr: SocketAddr,
    state: Arc<EdgeState>,
) -> Result<(), std::io::Error> {
    info!(addr = %listen_addr, "starting edge HTTP server");
    let listener = TcpListener::bind(listen_addr).await?;
    axum::serve(listener, app(state)).await
}

use crate::config::parse::load_config;
use crate::edge::server::start_server;
use crate::edge::store::FsRetryStore;
use crate::edge::sweep::run_sweeper;
use crate::edge::EdgeState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum EdgeRunError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::parse::ConfigError),

    #[error("edge section missing from config")]
    MissingEdgeConfig,

    #[error("invalid listen address: {0}")]
    ListenAddr(#[from] std::net::AddrParseError),

    #[error("store error: {0}")]
    Store(#[from] crate::edge::store::StoreError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = super::require_config(config_path);
    run_edge(&config_path).await.map_err(|e| e.into())
}

async fn run_edge(config_path: &PathBuf) -> Result<(), EdgeRunError> {
    let config = load_config(config_path)?;
    let edge_config = config.edge.ok_or(EdgeRunError::MissingEdgeConfig)?;

    let listen_addr: SocketAddr = edge_config.listen.parse()?;
    let sweep_interval = Duration::from_secs(edge_config.sweep_interval_secs.max(1));

    let store = Arc::new(FsRetryStore::new(edge_config.queue_dir.clone())?);
    let state = Arc::new(EdgeState::new(edge_config, store)?);

    info!(
        sweep_interval_secs = sweep_interval.as_secs(),
        "starting retry sweeper"
    );
    let sweeper_state = state.clone();
    let sweeper = tokio::spawn(async move {
        run_sweeper(sweeper_state, sweep_interval).await;
    });

    tokio::select! {
        result = start_server(listen_addr, state) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    sweeper.abort();
    info!("edge server stopped");
    Ok(())
}

use crate::config::parse::load_config;
use crate::watch::{run_watch, Coordinator};
use std::path::PathBuf;
use tracing::info;

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = super::require_config(config_path);

    info!(config_path = %config_path.display(), "loading configuration");
    let config = load_config(&config_path)?;

    let coordinator = Coordinator::new(&config)?;
    run_watch(&config, coordinator).await?;

    Ok(())
}

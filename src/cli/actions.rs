use crate::config::parse::load_config;
use crate::delivery::client::{DeliveryClient, DeliveryError};
use crate::delivery::payload::DeliveryMode;
use crate::inventory;
use crate::watch::Coordinator;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::parse::ConfigError),

    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no inventory file found for character '{0}'")]
    InventoryNotFound(String),
}

/// Operator-triggered scan. Unlike the background cycle, failures surface.
pub async fn scan(
    config_path: Option<PathBuf>,
    export: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = super::require_config(config_path);
    let config = load_config(&config_path)?;
    let mut coordinator = Coordinator::new(&config)?;

    match export {
        Some(path) => {
            coordinator.scan_all();
            let blob = coordinator.export_blob()?;
            std::fs::write(&path, serde_json::to_string_pretty(&blob)?)?;
            info!(path = %path.display(), "snapshot blob written");
            println!("Wrote {}", path.display());
        }
        None => {
            coordinator.initial_cycle().await?;
            println!("Scan complete, state delivered.");
        }
    }
    Ok(())
}

/// Manual resend: an externally supplied JSON blob goes through the same
/// transport call as regular deliveries.
pub async fn send_file(
    config_path: Option<PathBuf>,
    file: &Path,
    mode: DeliveryMode,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = super::require_config(config_path);
    let config = load_config(&config_path)?;

    let raw = std::fs::read_to_string(file).map_err(ActionError::Io)?;
    let blob: serde_json::Value = serde_json::from_str(&raw).map_err(ActionError::Json)?;

    let mut client = DeliveryClient::new(&config.endpoint)?;
    client.send_raw(blob, mode).await?;
    println!("Sent {}", file.display());
    Ok(())
}

pub async fn send_inventory(
    config_path: Option<PathBuf>,
    character: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = super::require_config(config_path);
    let config = load_config(&config_path)?;

    let files = inventory::list_inventory_files(config.watch.base_dir.as_deref());
    let file = files
        .into_iter()
        .find(|f| f.character.eq_ignore_ascii_case(character))
        .ok_or_else(|| ActionError::InventoryNotFound(character.to_string()))?;

    let rows = inventory::read_inventory_tsv(&file.path).map_err(ActionError::Io)?;
    let meta = inventory::file_meta(&file);

    let mut inventories = HashMap::new();
    inventories.insert(file.character.clone(), rows);
    let mut inventory_meta = HashMap::new();
    inventory_meta.insert(file.character.clone(), meta);

    let blob = json!({
        "zoneTab": config.endpoint.destination_tab,
        "latest": {},
        "inventories": inventories,
        "inventoryMeta": inventory_meta,
    });

    let mut client = DeliveryClient::new(&config.endpoint)?;
    client.send_raw(blob, DeliveryMode::DirectImport).await?;
    println!("Sent inventory for {}", file.character);
    Ok(())
}

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub endpoint: EndpointConfig,
    pub watch: WatchConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub edge: Option<EdgeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Backend (or edge proxy) URL deliveries are posted to.
    pub url: String,
    /// Shared secret sent in the X-Auth header when set.
    #[serde(default)]
    pub shared_secret: Option<String>,
    /// Logical destination tab carried in every blob.
    #[serde(default = "default_destination_tab")]
    pub destination_tab: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_destination_tab() -> String {
    "Zone Tracker".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Directory containing eqlog_<name>_*.txt files.
    pub log_dir: PathBuf,
    /// Directory containing *-Inventory.txt files (optional).
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Periodic full-rescan interval; 0 disables the rescan timer.
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
}

fn default_debounce_ms() -> u64 {
    250
}

fn default_scan_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    /// Where the authoritative per-source map is persisted between runs.
    /// Defaults to ~/.local/state/zonewatch/snapshot.json.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    #[serde(default = "default_edge_listen")]
    pub listen: String,
    /// True backend destination. When unset, each request must embed one.
    #[serde(default)]
    pub backend_url: Option<String>,
    /// Secret inbound callers must present in x-auth.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Secret forwarded upstream in X-Auth.
    #[serde(default)]
    pub backend_secret: Option<String>,
    /// Token gating POST /diag.
    #[serde(default)]
    pub admin_token: Option<String>,
    /// Directory holding queued retry entries.
    pub queue_dir: PathBuf,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Static default for the diagnostics flag; the persisted toggle wins.
    #[serde(default)]
    pub diag_default: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_edge_listen() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl StateConfig {
    pub fn resolved_snapshot_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.snapshot_path {
            return Some(path.clone());
        }
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .map(|d| d.join("zonewatch/snapshot.json"))
    }
}

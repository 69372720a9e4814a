use crate::source::timestamp::now_utc_stamp;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A delivery the backend could not take, parked for the retry sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedRetry {
    /// Resolved backend destination at enqueue time.
    pub target: String,
    /// Original request body, byte-for-byte.
    pub body: String,
    pub enqueued_at: String,
}

impl QueuedRetry {
    pub fn new(target: String, body: String) -> Self {
        Self {
            target,
            body,
            enqueued_at: now_utc_stamp(),
        }
    }
}

/// Fresh key per write: zero-padded unix millis keep keys monotonically
/// ordered, the uuid keeps concurrent writers contention-free.
pub fn fresh_key() -> String {
    let now = chrono::Utc::now().timestamp_millis();
    format!("q-{:013}-{}", now, Uuid::new_v4())
}

/// Durable side-channel for failed forwards. Writes never contend (every
/// entry gets a fresh key); concurrent sweeps are tolerated because delivery
/// is at-least-once.
#[async_trait]
pub trait RetryStore: Send + Sync {
    /// Persist an entry, returning its key.
    async fn put(&self, entry: &QueuedRetry) -> Result<String>;
    /// All entry keys, sorted (oldest first).
    async fn list_keys(&self) -> Result<Vec<String>>;
    /// Raw stored text for a key, or None when already gone.
    async fn read(&self, key: &str) -> Result<Option<String>>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Persisted boolean flags (diagnostics toggle). None = never set.
    async fn read_flag(&self, name: &str) -> Result<Option<bool>>;
    async fn write_flag(&self, name: &str, value: bool) -> Result<()>;
}

/// One JSON file per queued entry under a spool directory.
pub struct FsRetryStore {
    dir: PathBuf,
}

impl FsRetryStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn flag_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("flag-{}", name))
    }
}

#[async_trait]
impl RetryStore for FsRetryStore {
    async fn put(&self, entry: &QueuedRetry) -> Result<String> {
        let key = fresh_key();
        let json = serde_json::to_string(entry)?;
        tokio::fs::write(self.entry_path(&key), json).await?;
        Ok(key)
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(key) = name.strip_suffix(".json") {
                if key.starts_with("q-") {
                    keys.push(key.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn read(&self, key: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.entry_path(key)).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            // Deleted by a concurrent sweep; at-least-once makes this fine.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_flag(&self, name: &str) -> Result<Option<bool>> {
        match tokio::fs::read_to_string(self.flag_path(name)).await {
            Ok(raw) => Ok(Some(raw.trim() == "1")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_flag(&self, name: &str, value: bool) -> Result<()> {
        let raw = if value { "1" } else { "0" };
        tokio::fs::write(self.flag_path(name), raw).await?;
        Ok(())
    }
}

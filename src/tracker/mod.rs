use crate::source::timestamp::now_utc_stamp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// The most recently detected event for one source. Never a history: the
/// authoritative map holds at most one of these per source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneState {
    pub source_id: String,
    /// Free-form label of the detected condition.
    pub zone: String,
    /// Canonical UTC stamp from the log line, or empty when unknown.
    pub detected_ts: String,
    /// Wall-clock time of local detection. Never part of change comparison.
    pub updated_utc: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    saved_at: String,
    latest: HashMap<String, ZoneState>,
}

/// Owns the authoritative "latest known state per source" map and the
/// pending-delivery map of deltas not yet acknowledged by the backend.
/// All mutation happens on the single pipeline task; no interior locking.
#[derive(Debug, Default)]
pub struct StateStore {
    latest: HashMap<String, ZoneState>,
    pending: HashMap<String, ZoneState>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly extracted event for a source. Returns true when the
    /// event differs from the known state (by zone or detected timestamp) and
    /// was staged for delivery. An empty label never upserts.
    pub fn upsert(&mut self, source_id: &str, zone: &str, detected_ts: &str) -> bool {
        if zone.is_empty() {
            return false;
        }

        let candidate = ZoneState {
            source_id: source_id.to_string(),
            zone: zone.to_string(),
            detected_ts: detected_ts.to_string(),
            updated_utc: now_utc_stamp(),
        };

        let changed = match self.latest.get(source_id) {
            Some(prev) => prev.zone != candidate.zone || prev.detected_ts != candidate.detected_ts,
            None => true,
        };

        // Always overwrite so updated_utc reflects the latest detection.
        self.latest.insert(source_id.to_string(), candidate.clone());

        if changed {
            debug!(source_id, zone, detected_ts, "staging delta");
            self.pending.insert(source_id.to_string(), candidate);
        }

        changed
    }

    /// Snapshot of everything staged for delivery.
    pub fn pending_snapshot(&self) -> HashMap<String, ZoneState> {
        self.pending.clone()
    }

    /// Snapshot of the full authoritative map.
    pub fn latest_snapshot(&self) -> HashMap<String, ZoneState> {
        self.latest.clone()
    }

    pub fn pending_is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn latest_is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    /// Clear pending deltas the backend just accepted, but only where the
    /// pending value still exactly matches what was sent. A newer local
    /// change that raced the acknowledgment survives for the next flush.
    pub fn acknowledge(&mut self, sent: &HashMap<String, ZoneState>) -> usize {
        let mut cleared = 0;
        for (source_id, sent_state) in sent {
            if self.pending.get(source_id) == Some(sent_state) {
                self.pending.remove(source_id);
                cleared += 1;
            }
        }
        cleared
    }

    /// Persist the authoritative map. Pending deltas are not persisted: on
    /// restart a full snapshot send covers anything unacknowledged.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at: now_utc_stamp(),
            latest: self.latest.clone(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), sources = self.latest.len(), "snapshot saved");
        Ok(())
    }

    /// Reload the authoritative map from a previous run. A missing, stale or
    /// corrupt snapshot is ignored with a log line, never fatal.
    pub fn load_snapshot(&mut self, path: &Path) {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "snapshot read failed");
                return;
            }
        };

        match serde_json::from_str::<Snapshot>(&raw) {
            Ok(snapshot) if snapshot.version == SNAPSHOT_VERSION => {
                info!(
                    path = %path.display(),
                    sources = snapshot.latest.len(),
                    "snapshot restored"
                );
                self.latest = snapshot.latest;
            }
            Ok(snapshot) => {
                warn!(
                    version = snapshot.version,
                    expected = SNAPSHOT_VERSION,
                    "snapshot version mismatch, ignoring"
                );
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "snapshot parse failed, ignoring");
            }
        }
    }
}

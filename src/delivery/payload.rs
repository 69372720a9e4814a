use crate::tracker::ZoneState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How the backend should treat a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMode {
    /// Apply the payload immediately.
    #[serde(rename = "directImport")]
    DirectImport,
    /// Persist only, no auto-processing.
    #[serde(rename = "storeJson")]
    StoreJson,
}

/// Closed set of payload shapes. All three share the same transport call but
/// carry different content.
#[derive(Debug, Clone)]
pub enum DeliveryBatch {
    /// Incremental deltas not yet acknowledged.
    Deltas(HashMap<String, ZoneState>),
    /// The full authoritative map (fresh start with a restored snapshot).
    Snapshot(HashMap<String, ZoneState>),
    /// Externally supplied blob, passed through untouched (manual resend).
    Raw(serde_json::Value),
}

impl DeliveryBatch {
    /// Number of per-source states carried, where that is meaningful.
    pub fn len(&self) -> usize {
        match self {
            DeliveryBatch::Deltas(map) | DeliveryBatch::Snapshot(map) => map.len(),
            DeliveryBatch::Raw(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            DeliveryBatch::Deltas(map) | DeliveryBatch::Snapshot(map) => map.is_empty(),
            DeliveryBatch::Raw(_) => false,
        }
    }
}

/// Wire blob for zone batches: the destination tag plus the per-source map.
/// Inventory exports ride in the optional fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneBlob {
    pub zone_tab: String,
    pub latest: HashMap<String, ZoneState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventories: Option<HashMap<String, Vec<Vec<String>>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory_meta: Option<HashMap<String, InventoryMeta>>,
}

impl ZoneBlob {
    pub fn new(zone_tab: &str, latest: HashMap<String, ZoneState>) -> Self {
        Self {
            zone_tab: zone_tab.to_string(),
            latest,
            inventories: None,
            inventory_meta: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryMeta {
    pub file_name: String,
    pub created_iso: String,
    pub modified_iso: String,
}

/// Outer transmission envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub mode: DeliveryMode,
    pub blob: serde_json::Value,
    /// storeJson deliveries explicitly disable auto-processing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_process: Option<bool>,
}

impl Envelope {
    pub fn build(
        batch: &DeliveryBatch,
        mode: DeliveryMode,
        zone_tab: &str,
    ) -> Result<Self, serde_json::Error> {
        let blob = match batch {
            DeliveryBatch::Deltas(map) | DeliveryBatch::Snapshot(map) => {
                serde_json::to_value(ZoneBlob::new(zone_tab, map.clone()))?
            }
            DeliveryBatch::Raw(value) => value.clone(),
        };

        Ok(Self {
            mode,
            blob,
            auto_process: match mode {
                DeliveryMode::StoreJson => Some(false),
                DeliveryMode::DirectImport => None,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::ZoneState;

    fn state(zone: &str) -> ZoneState {
        ZoneState {
            source_id: "Vanidor".to_string(),
            zone: zone.to_string(),
            detected_ts: "2024-01-01 10:00:00".to_string(),
            updated_utc: "2024-01-01 10:00:05".to_string(),
        }
    }

    #[test]
    fn test_delta_envelope_shape() {
        let mut map = HashMap::new();
        map.insert("Vanidor".to_string(), state("Qeynos"));

        let envelope =
            Envelope::build(&DeliveryBatch::Deltas(map), DeliveryMode::DirectImport, "Zones")
                .unwrap();
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["mode"], "directImport");
        assert_eq!(json["blob"]["zoneTab"], "Zones");
        assert_eq!(json["blob"]["latest"]["Vanidor"]["zone"], "Qeynos");
        assert_eq!(
            json["blob"]["latest"]["Vanidor"]["detectedTs"],
            "2024-01-01 10:00:00"
        );
        assert!(json.get("autoProcess").is_none());
    }

    #[test]
    fn test_store_json_disables_auto_process() {
        let envelope = Envelope::build(
            &DeliveryBatch::Raw(serde_json::json!({"zoneTab": "Zones", "latest": {}})),
            DeliveryMode::StoreJson,
            "Zones",
        )
        .unwrap();
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["mode"], "storeJson");
        assert_eq!(json["autoProcess"], false);
    }

    #[test]
    fn test_raw_blob_passes_through() {
        let raw = serde_json::json!({"anything": [1, 2, 3]});
        let envelope = Envelope::build(
            &DeliveryBatch::Raw(raw.clone()),
            DeliveryMode::DirectImport,
            "ignored",
        )
        .unwrap();
        assert_eq!(envelope.blob, raw);
    }
}

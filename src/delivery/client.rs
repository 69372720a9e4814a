use crate::config::types::EndpointConfig;
use crate::delivery::payload::{DeliveryBatch, DeliveryMode, Envelope};
use crate::tracker::StateStore;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Floor for the rate-limit cooldown; a larger server-advised value wins.
const MIN_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("backend rejected delivery with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("rate limited, cooling down for {0:?}")]
    RateLimited(Duration),
}

pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Outcome of one flush attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Deltas accepted; this many were cleared from pending.
    Sent(usize),
    /// Nothing was pending.
    Nothing,
    /// Inside a rate-limit cooldown; nothing was attempted.
    CoolingDown,
}

/// HTTP client for the collector endpoint. One logical owner (the pipeline
/// task) mutates the cooldown state; no locking needed.
pub struct DeliveryClient {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
    zone_tab: String,
    backoff_until: Option<Instant>,
}

impl DeliveryClient {
    pub fn new(config: &EndpointConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.trim().to_string(),
            secret: config.shared_secret.clone(),
            zone_tab: config.destination_tab.clone(),
            backoff_until: None,
        })
    }

    /// True while a rate-limit cooldown is in effect.
    pub fn cooling_down(&self) -> bool {
        self.backoff_until
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }

    /// Flush the pending-delta map. Transport failures leave pending
    /// untouched so the next cycle retries the same deltas; on success only
    /// deltas still identical to what was sent are cleared.
    pub async fn flush_pending(&mut self, store: &mut StateStore) -> Result<FlushOutcome> {
        if self.cooling_down() {
            debug!("flush skipped, rate-limit cooldown active");
            return Ok(FlushOutcome::CoolingDown);
        }

        let sent = store.pending_snapshot();
        if sent.is_empty() {
            return Ok(FlushOutcome::Nothing);
        }

        self.post(
            &DeliveryBatch::Deltas(sent.clone()),
            DeliveryMode::DirectImport,
        )
        .await?;

        let cleared = store.acknowledge(&sent);
        info!(sent = sent.len(), cleared, "pending deltas delivered");
        Ok(FlushOutcome::Sent(cleared))
    }

    /// Send the full authoritative map (used when local state exists but
    /// nothing is pending, e.g. fresh start with a restored snapshot).
    pub async fn send_snapshot(&mut self, store: &StateStore) -> Result<()> {
        let snapshot = store.latest_snapshot();
        if snapshot.is_empty() {
            return Ok(());
        }
        let count = snapshot.len();
        self.post(
            &DeliveryBatch::Snapshot(snapshot),
            DeliveryMode::DirectImport,
        )
        .await?;
        info!(sources = count, "full snapshot delivered");
        Ok(())
    }

    /// Send an externally supplied payload through the same transport call.
    pub async fn send_raw(&mut self, blob: serde_json::Value, mode: DeliveryMode) -> Result<()> {
        self.post(&DeliveryBatch::Raw(blob), mode).await
    }

    /// Build a full-snapshot blob without sending it (local export path).
    pub fn export_blob(&self, store: &StateStore) -> Result<serde_json::Value> {
        let batch = DeliveryBatch::Snapshot(store.latest_snapshot());
        let envelope = Envelope::build(&batch, DeliveryMode::DirectImport, &self.zone_tab)?;
        Ok(envelope.blob)
    }

    async fn post(&mut self, batch: &DeliveryBatch, mode: DeliveryMode) -> Result<()> {
        let envelope = Envelope::build(batch, mode, &self.zone_tab)?;

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&envelope);
        if let Some(secret) = &self.secret {
            request = request.header("X-Auth", secret);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.as_u16() == 429 {
            let advised = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::ZERO);
            let cooldown = advised.max(MIN_BACKOFF);
            self.backoff_until = Some(Instant::now() + cooldown);
            warn!(cooldown_secs = cooldown.as_secs(), "backend rate limited");
            return Err(DeliveryError::RateLimited(cooldown));
        }

        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        // A 2xx with an explicit ok:false is still a rejection.
        if let Ok(payload) = serde_json::from_str::<serde_json::Value>(&body) {
            if payload.get("ok") == Some(&serde_json::Value::Bool(false)) {
                return Err(DeliveryError::Rejected {
                    status: status.as_u16(),
                    body: truncate(&body, 200),
                });
            }
        }

        Ok(())
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

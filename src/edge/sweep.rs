use crate::edge::api::EdgeState;
use crate::edge::store::QueuedRetry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One pass over the durable store. Successful redeliveries and structurally
/// invalid entries are deleted; everything else stays for the next sweep.
/// There is deliberately no max-retry cutoff or backoff: entries persist
/// until delivered or manually removed.
pub async fn sweep_once(state: &EdgeState) -> usize {
    let keys = match state.store.list_keys().await {
        Ok(keys) => keys,
        Err(e) => {
            warn!(error = %e, "retry sweep could not list entries");
            return 0;
        }
    };

    let diag = state.diag_enabled().await;
    if diag && !keys.is_empty() {
        info!(entries = keys.len(), "retry sweep starting");
    }

    let mut delivered = 0;
    for key in keys {
        let raw = match state.store.read(&key).await {
            Ok(Some(raw)) => raw,
            // Gone already (concurrent sweep); nothing to do.
            Ok(None) => continue,
            Err(e) => {
                warn!(key = %key, error = %e, "retry entry read failed");
                continue;
            }
        };

        let entry: QueuedRetry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(_) => {
                warn!(key = %key, "dropping structurally invalid retry entry");
                let _ = state.store.delete(&key).await;
                continue;
            }
        };
        if entry.target.is_empty() || entry.body.is_empty() {
            warn!(key = %key, "dropping retry entry with missing fields");
            let _ = state.store.delete(&key).await;
            continue;
        }

        let mut request = state
            .client
            .post(&entry.target)
            .header("Content-Type", "application/json")
            .body(entry.body.clone());
        if let Some(secret) = &state.config.backend_secret {
            request = request.header("X-Auth", secret);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                if let Err(e) = state.store.delete(&key).await {
                    warn!(key = %key, error = %e, "delete after redelivery failed");
                } else {
                    delivered += 1;
                    if diag {
                        info!(key = %key, "queued delivery redelivered");
                    }
                }
            }
            Ok(response) => {
                if diag {
                    info!(key = %key, status = response.status().as_u16(), "still failing");
                }
            }
            Err(e) => {
                debug!(key = %key, error = %e, "retry attempt failed");
            }
        }
    }

    delivered
}

/// Time-triggered sweep loop.
pub async fn run_sweeper(state: Arc<EdgeState>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // Skip the immediate first tick.
    ticker.reset();

    loop {
        ticker.tick().await;
        let delivered = sweep_once(&state).await;
        if delivered > 0 {
            info!(delivered, "retry sweep delivered queued entries");
        }
    }
}

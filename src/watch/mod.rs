use crate::config::types::Config;
use crate::delivery::client::{DeliveryClient, DeliveryError};
use crate::source::catalog::{self, Source};
use crate::source::tail::TailExtractor;
use crate::tracker::StateStore;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Drives extraction, change tracking and delivery on one logical task.
/// All map mutation happens here; the only suspension points are file reads
/// and network calls.
pub struct Coordinator {
    log_dir: PathBuf,
    snapshot_path: Option<PathBuf>,
    extractor: TailExtractor,
    store: StateStore,
    client: DeliveryClient,
    /// Serializes scan-and-flush cycles: a new cycle is skipped, not queued,
    /// while one is running.
    cycle_in_flight: bool,
}

impl Coordinator {
    pub fn new(config: &Config) -> Result<Self, DeliveryError> {
        let client = DeliveryClient::new(&config.endpoint)?;
        let snapshot_path = config.state.resolved_snapshot_path();

        let mut store = StateStore::new();
        if let Some(path) = &snapshot_path {
            store.load_snapshot(path);
        }

        Ok(Self {
            log_dir: config.watch.log_dir.clone(),
            snapshot_path,
            extractor: TailExtractor::new(),
            store,
            client,
            cycle_in_flight: false,
        })
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn client_mut(&mut self) -> &mut DeliveryClient {
        &mut self.client
    }

    /// Full-snapshot blob for local export.
    pub fn export_blob(&self) -> Result<serde_json::Value, DeliveryError> {
        self.client.export_blob(&self.store)
    }

    /// Re-extract one source and record the result. Extraction returning no
    /// event leaves prior state untouched.
    pub fn process_source(&mut self, source: &Source) {
        if let Some(event) = self.extractor.extract_last(&source.path) {
            if self.store.upsert(&source.id, &event.label, &event.timestamp) {
                info!(
                    source_id = %source.id,
                    zone = %event.label,
                    "zone change detected"
                );
            }
        }
    }

    /// Re-extract every cataloged source. Safety net against missed
    /// file-system notifications.
    pub fn scan_all(&mut self) {
        for source in catalog::list_sources(&self.log_dir) {
            self.process_source(&source);
        }
    }

    /// One full scan-and-flush cycle. Skipped entirely when another cycle is
    /// in flight; background failures are logged and retried next tick.
    pub async fn periodic_cycle(&mut self) {
        if self.cycle_in_flight {
            debug!("cycle already in flight, skipping");
            return;
        }
        self.cycle_in_flight = true;

        self.scan_all();
        if let Err(e) = self.client.flush_pending(&mut self.store).await {
            warn!(error = %e, "flush failed, deltas remain pending");
        }
        self.persist_snapshot();

        self.cycle_in_flight = false;
    }

    /// Startup cycle: scan everything, then either flush new deltas or, when
    /// nothing is pending but restored state exists, resend the full
    /// snapshot so the backend converges without waiting for a change.
    pub async fn initial_cycle(&mut self) -> Result<(), DeliveryError> {
        if self.cycle_in_flight {
            return Ok(());
        }
        self.cycle_in_flight = true;

        self.scan_all();
        let result = if self.store.pending_is_empty() && !self.store.latest_is_empty() {
            self.client.send_snapshot(&self.store).await
        } else {
            self.client.flush_pending(&mut self.store).await.map(|_| ())
        };
        self.persist_snapshot();

        self.cycle_in_flight = false;
        result
    }

    fn persist_snapshot(&self) {
        if let Some(path) = &self.snapshot_path {
            if let Err(e) = self.store.save_snapshot(path) {
                warn!(path = %path.display(), error = %e, "snapshot save failed");
            }
        }
    }
}

/// Runs the watch loop until Ctrl+C: file-system notifications are debounced
/// per source, a periodic timer drives full rescans, and each debounce expiry
/// triggers re-extraction of exactly one source.
pub async fn run_watch(config: &Config, mut coordinator: Coordinator) -> Result<(), WatchError> {
    let debounce = Duration::from_millis(config.watch.debounce_ms);
    let log_dir = config.watch.log_dir.clone();

    // Bridge notify's callback thread into the pipeline task.
    let (fs_tx, mut fs_rx) = mpsc::unbounded_channel::<PathBuf>();
    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        match res {
            Ok(event) => {
                if matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
                ) {
                    for path in event.paths {
                        let _ = fs_tx.send(path);
                    }
                }
            }
            Err(e) => warn!(error = %e, "file watcher error"),
        }
    })?;
    watcher.watch(&log_dir, RecursiveMode::NonRecursive)?;
    info!(dir = %log_dir.display(), "watching log directory");

    // Per-source debounce timers; only the latest timer per source is live.
    let (debounced_tx, mut debounced_rx) = mpsc::unbounded_channel::<Source>();
    let mut timers: HashMap<String, JoinHandle<()>> = HashMap::new();

    let mut rescan = if config.watch.scan_interval_secs > 0 {
        let mut interval =
            tokio::time::interval(Duration::from_secs(config.watch.scan_interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The immediate first tick would duplicate the initial cycle.
        interval.reset();
        Some(interval)
    } else {
        None
    };

    if let Err(e) = coordinator.initial_cycle().await {
        // Not fatal: the periodic cycle retries, and pending state survives.
        error!(error = %e, "initial scan-and-send failed");
    }

    loop {
        tokio::select! {
            Some(path) = fs_rx.recv() => {
                if let Some(source) = source_for_path(&path) {
                    schedule_debounce(&mut timers, &debounced_tx, source, debounce);
                }
            }
            Some(source) = debounced_rx.recv() => {
                timers.remove(&source.id);
                coordinator.process_source(&source);
            }
            _ = tick(&mut rescan) => {
                coordinator.periodic_cycle().await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    for (_, timer) in timers.drain() {
        timer.abort();
    }
    coordinator.persist_snapshot();
    info!("watch loop stopped");
    Ok(())
}

async fn tick(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        // Periodic rescan disabled; never resolves.
        None => std::future::pending::<()>().await,
    }
}

fn source_for_path(path: &Path) -> Option<Source> {
    let file_name = path.file_name()?.to_str()?;
    let id = catalog::source_id_from_file_name(file_name)?;
    Some(Source {
        id,
        file_name: file_name.to_string(),
        path: path.to_path_buf(),
    })
}

/// Restart the debounce timer for a source: the previous timer is cancelled
/// so rapid write bursts collapse into one extraction.
fn schedule_debounce(
    timers: &mut HashMap<String, JoinHandle<()>>,
    debounced_tx: &mpsc::UnboundedSender<Source>,
    source: Source,
    debounce: Duration,
) {
    if let Some(previous) = timers.remove(&source.id) {
        previous.abort();
    }

    let tx = debounced_tx.clone();
    let id = source.id.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(debounce).await;
        let _ = tx.send(source);
    });
    timers.insert(id, handle);
}

//! Entry point tying storage, transport and scheduler together.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::info;

use crate::Result;
use crate::clock::Clock;
use crate::config::TelemetryConfig;
use crate::events::{UploadEvent, UploadEventBroadcaster};
use crate::ping::{Ping, RawRecord};
use crate::quota::QuotaTracker;
use crate::scheduler::{RunReport, UploadScheduler};
use crate::storage::{FileStorage, PingStorage};
use crate::transport::{HttpTransport, PingTransport};

/// Pings still waiting in ready files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingPings {
    pub files: usize,
    pub records: usize,
}

/// Queues pings and uploads them, one run per category at a time.
pub struct Telemetry<S, T> {
    config: Arc<TelemetryConfig>,
    storage: Arc<S>,
    scheduler: UploadScheduler<S, T>,
    events: UploadEventBroadcaster,
    run_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Telemetry<FileStorage, HttpTransport> {
    /// Build the on-disk storage and HTTP transport described by `config`.
    pub async fn open(config: TelemetryConfig) -> Result<Self> {
        config.validate()?;

        let storage = FileStorage::open(&config.data_dir, config.max_files_per_category).await?;
        let transport = HttpTransport::new(&config)?;

        info!(
            data_dir = %config.data_dir.display(),
            endpoint = %config.server_endpoint,
            "Telemetry uploader ready"
        );
        Ok(Self::new(config, Arc::new(storage), Arc::new(transport)))
    }
}

impl<S, T> Telemetry<S, T>
where
    S: PingStorage,
    T: PingTransport,
{
    pub fn new(config: TelemetryConfig, storage: Arc<S>, transport: Arc<T>) -> Self {
        let config = Arc::new(config);
        let events = UploadEventBroadcaster::new();
        let scheduler =
            UploadScheduler::new(config.clone(), storage.clone(), transport, events.clone());

        Self {
            config,
            storage,
            scheduler,
            events,
            run_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.scheduler = self.scheduler.with_clock(clock);
        self
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn quota(&self) -> &QuotaTracker<S> {
        self.scheduler.quota()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }

    /// Store a ping under its ping type until the next upload run.
    pub async fn queue(&self, ping: &Ping) -> Result<()> {
        self.storage
            .enqueue(&ping.ping_type, ping.to_record())
            .await
    }

    /// Store an already serialized record under `category`.
    pub async fn queue_record(&self, category: &str, record: RawRecord) -> Result<()> {
        self.storage.enqueue(category, record).await
    }

    /// Run the scheduler for `category`, waiting for any run already in
    /// progress for it to finish first.
    pub async fn schedule_upload(&self, category: &str) -> RunReport {
        let lock = self.run_lock(category);
        let _guard = lock.lock().await;
        self.scheduler.run(category).await
    }

    /// Ready files and records of `category`, without sealing new ones.
    pub async fn pending(&self, category: &str) -> Result<PendingPings> {
        let files = self.storage.read_all_ready(category).await?;
        Ok(PendingPings {
            files: files.len(),
            records: files.iter().map(|file| file.records.len()).sum(),
        })
    }

    fn run_lock(&self, category: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.run_locks
            .lock()
            .entry(category.to_string())
            .or_default()
            .clone()
    }
}

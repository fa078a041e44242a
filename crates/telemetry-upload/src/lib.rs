//! # Telemetry Upload
//!
//! Queues telemetry pings on disk and uploads them to a collector, one at a
//! time and in the order they were recorded, while keeping each category
//! under a daily upload quota.
//!
//! ## Features
//!
//! - Per-category daily quota that resets on the local calendar date
//! - Sequential drain of ready ping files with partial-progress persistence
//! - Pluggable `PingStorage` and `PingTransport` backends
//! - Upload error and run completion events over a broadcast channel
//!
//! ## License
//!
//! MIT License
//!

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod ping;
pub mod queue;
pub mod quota;
pub mod scheduler;
pub mod storage;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
mod test_utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TelemetryConfig;
pub use error::{Error, ErrorKind, Result};
pub use events::{UploadEvent, UploadEventBroadcaster};
pub use ping::{Ping, RawRecord};
pub use queue::WorkQueue;
pub use quota::{QuotaState, QuotaTracker};
pub use scheduler::{HaltReason, RunReport, UploadScheduler};
pub use storage::{FileStorage, MemoryStorage, PingFile, PingFileId, PingStorage};
pub use telemetry::{PendingPings, Telemetry};
pub use transport::{HttpTransport, PingTransport, UploadError, UploadOutcome};

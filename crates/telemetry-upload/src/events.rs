//! Upload events.
//!
//! The scheduler reports per-record failures and finished runs through an
//! [`UploadEventBroadcaster`] handed to it at construction. Publishing is
//! fire and forget: having no subscriber is not an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::ErrorKind;
use crate::scheduler::RunReport;

/// Events emitted while draining a category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UploadEvent {
    /// A ping could not be uploaded and was dropped or left in place.
    UploadError {
        category: String,
        kind: ErrorKind,
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// A scheduler run reached its terminal state.
    RunFinished {
        report: RunReport,
        timestamp: DateTime<Utc>,
    },
}

impl UploadEvent {
    pub fn upload_error(
        category: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::UploadError {
            category: category.into(),
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn category(&self) -> &str {
        match self {
            Self::UploadError { category, .. } => category,
            Self::RunFinished { report, .. } => &report.category,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::UploadError { .. } => "upload_error",
            Self::RunFinished { .. } => "run_finished",
        }
    }
}

/// Broadcaster for upload events.
#[derive(Clone)]
pub struct UploadEventBroadcaster {
    sender: broadcast::Sender<UploadEvent>,
}

impl UploadEventBroadcaster {
    /// Create a new broadcaster with default capacity (256).
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.sender.subscribe()
    }

    /// Publish an event, returning how many subscribers received it.
    pub fn publish(&self, event: UploadEvent) -> usize {
        // No subscribers is fine.
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for UploadEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

//! Ping transport.

mod http;

pub use http::HttpTransport;

use async_trait::async_trait;

use crate::error::ErrorKind;
use crate::ping::Ping;

/// Failure attached to an upload outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadError {
    pub kind: ErrorKind,
    pub message: String,
}

impl UploadError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Result of a single upload attempt.
///
/// `status` is the HTTP status code, or 0 when no response was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub status: u16,
    pub error: Option<UploadError>,
}

impl UploadOutcome {
    /// An HTTP response was received.
    pub fn response(status: u16) -> Self {
        Self {
            status,
            error: None,
        }
    }

    /// No HTTP response was received.
    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: 0,
            error: Some(UploadError::new(kind, message)),
        }
    }

    /// Whether the ping is resolved and must be removed from storage.
    ///
    /// Any status from 200 up counts, server errors included. Pings that
    /// failed in a way no retry can fix count as well.
    pub fn is_consumed(&self) -> bool {
        self.status >= 200
            || self
                .error
                .as_ref()
                .is_some_and(|error| error.kind.is_fatal_for_record())
    }
}

/// Uploads one ping at a time.
#[async_trait]
pub trait PingTransport: Send + Sync {
    /// Attempt to upload `ping`. Failures are reported in the outcome.
    async fn upload(&self, ping: &Ping) -> UploadOutcome;
}

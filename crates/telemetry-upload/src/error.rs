//! Crate-wide error types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
///
/// These errors come from the collaborators (storage, configuration, HTTP
/// client construction). The upload scheduler never returns them to its
/// caller: a failing collaborator ends the run softly instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

/// Classification of a failed ping, as reported by the transport or the
/// scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A stored record could not be turned into a ping.
    CannotGeneratePing,
    /// The upload URL built from the endpoint and the ping's path is invalid.
    InvalidUploadUrl,
    /// The ping body could not be serialized.
    CannotGenerateJson,
    /// The request never produced an HTTP response.
    Network,
    /// Anything else the transport wants to report.
    Other,
}

impl ErrorKind {
    /// Whether resubmitting a ping that failed this way can never succeed.
    ///
    /// Such pings are removed from storage and counted against the quota as
    /// if they had been delivered.
    pub fn is_fatal_for_record(self) -> bool {
        matches!(self, Self::InvalidUploadUrl | Self::CannotGenerateJson)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CannotGeneratePing => "cannot_generate_ping",
            Self::InvalidUploadUrl => "invalid_upload_url",
            Self::CannotGenerateJson => "cannot_generate_json",
            Self::Network => "network",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Uploader configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Default collector endpoint.
pub const DEFAULT_SERVER_ENDPOINT: &str = "https://incoming.telemetry.mozilla.org";

/// Configuration shared by the storage, transport and scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Base URL pings are posted to; each ping's upload path is appended.
    pub server_endpoint: String,
    /// Value of the `User-Agent` header.
    pub user_agent: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Daily upload ceiling applied to every category without an override.
    pub max_uploads_per_day: u64,
    /// Per-category daily upload ceilings.
    pub max_uploads_per_day_by_category: HashMap<String, u64>,
    /// Ready files kept per category; older files are dropped first.
    pub max_files_per_category: usize,
    /// Directory holding ping files and quota counters.
    pub data_dir: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            server_endpoint: DEFAULT_SERVER_ENDPOINT.to_string(),
            user_agent: default_user_agent(),
            timeout_secs: 60,
            max_uploads_per_day: 100,
            max_uploads_per_day_by_category: HashMap::new(),
            max_files_per_category: 40,
            data_dir: PathBuf::from("telemetry-data"),
        }
    }
}

fn default_user_agent() -> String {
    format!("telemetry-upload/{}", env!("CARGO_PKG_VERSION"))
}

impl TelemetryConfig {
    /// Daily upload ceiling for `category`.
    pub fn max_uploads_for(&self, category: &str) -> u64 {
        self.max_uploads_per_day_by_category
            .get(category)
            .copied()
            .unwrap_or(self.max_uploads_per_day)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Parsed collector endpoint.
    pub fn endpoint(&self) -> Result<Url> {
        Ok(Url::parse(&self.server_endpoint)?)
    }

    /// Check the values that would otherwise only fail at upload time.
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.endpoint()?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "server endpoint must be http or https, got {}",
                endpoint.scheme()
            )));
        }

        if self.timeout_secs == 0 {
            return Err(Error::config("timeout_secs must be greater than zero"));
        }

        if self.max_files_per_category == 0 {
            return Err(Error::config(
                "max_files_per_category must be greater than zero",
            ));
        }

        Ok(())
    }
}

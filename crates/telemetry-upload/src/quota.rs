//! Per-category daily upload quota.
//!
//! The quota window is the current *local calendar day*: an upload at 23:59
//! and one at 00:01 the next day fall in different windows, while two uploads
//! 23 hours apart on the same date share one. There is no reset step. A count
//! whose timestamp lies on another date is simply treated as zero.
//!
//! State lives in storage as two independent entries per category:
//! `<category>-dailyUploadCount` (integer) and
//! `<category>-lastUploadTimestamp` (seconds since the Unix epoch).

use std::sync::Arc;

use chrono::{DateTime, Datelike, Local, TimeZone};
use serde_json::Value;
use tracing::debug;

use crate::Result;
use crate::clock::Clock;
use crate::storage::PingStorage;

/// Snapshot of a category's quota entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaState {
    pub daily_upload_count: u64,
    pub last_upload: DateTime<Local>,
}

/// Typed view over the quota entries kept in a [`PingStorage`].
pub struct QuotaTracker<S> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for QuotaTracker<S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S: PingStorage> QuotaTracker<S> {
    pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Stored upload count, or 0 when nothing usable is stored.
    pub async fn daily_count(&self, category: &str) -> Result<u64> {
        let value = self.storage.get(&count_key(category)).await?;
        Ok(value.as_ref().and_then(decode_count).unwrap_or(0))
    }

    /// Time of the last recorded upload, or now when nothing usable is stored.
    pub async fn last_upload_time(&self, category: &str) -> Result<DateTime<Local>> {
        let value = self.storage.get(&timestamp_key(category)).await?;
        Ok(value
            .as_ref()
            .and_then(decode_timestamp)
            .unwrap_or_else(|| self.clock.now()))
    }

    pub async fn state(&self, category: &str) -> Result<QuotaState> {
        Ok(QuotaState {
            daily_upload_count: self.daily_count(category).await?,
            last_upload: self.last_upload_time(category).await?,
        })
    }

    /// Uploads counted against today's window.
    pub async fn effective_count(&self, category: &str) -> Result<u64> {
        if !is_same_local_day(&self.last_upload_time(category).await?, &self.clock.now()) {
            return Ok(0);
        }
        self.daily_count(category).await
    }

    /// Whether today's window already holds `max_per_day` uploads.
    pub async fn has_reached_limit(&self, category: &str, max_per_day: u64) -> Result<bool> {
        if !is_same_local_day(&self.last_upload_time(category).await?, &self.clock.now()) {
            return Ok(false);
        }
        Ok(self.daily_count(category).await? >= max_per_day)
    }

    /// Count one more upload in today's window.
    pub async fn record_upload(&self, category: &str) -> Result<()> {
        let count = self.effective_count(category).await?.saturating_add(1);
        self.storage
            .set(&count_key(category), Value::from(count))
            .await?;

        let now = self.clock.now();
        self.storage
            .set(&timestamp_key(category), Value::from(encode_timestamp(&now)))
            .await?;

        debug!(category, count, "Recorded ping upload");
        Ok(())
    }
}

fn count_key(category: &str) -> String {
    format!("{}-dailyUploadCount", category)
}

fn timestamp_key(category: &str) -> String {
    format!("{}-lastUploadTimestamp", category)
}

fn decode_count(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
}

fn encode_timestamp(time: &DateTime<Local>) -> f64 {
    time.timestamp_millis() as f64 / 1000.0
}

fn decode_timestamp(value: &Value) -> Option<DateTime<Local>> {
    let secs = value.as_f64()?;
    if !secs.is_finite() {
        return None;
    }
    Local
        .timestamp_millis_opt((secs * 1000.0).round() as i64)
        .earliest()
}

/// Calendar-date comparison in the local timezone.
fn is_same_local_day(a: &DateTime<Local>, b: &DateTime<Local>) -> bool {
    a.year() == b.year() && a.month() == b.month() && a.day() == b.day()
}

//! Sequential upload scheduler.
//!
//! One run drains the ready ping files of a single category, one record at a
//! time:
//!
//! 1. Stop if the category's daily quota is used up.
//! 2. Move to the next file once the current one is empty; stop when no
//!    files remain.
//! 3. Materialize the next record. A malformed record is reported, dropped
//!    and the run continues.
//! 4. Upload it. A consumed outcome (any status from 200 up, or a failure no
//!    retry can fix) removes the record and counts against the quota. Any
//!    other outcome stops the run and leaves the record first in line for
//!    the next run.
//!
//! Exactly one upload is in flight at a time and each record's storage
//! updates complete before the next upload starts. Runs for the same
//! category must not overlap; [`Telemetry`](crate::Telemetry) serializes
//! them.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::Error;
use crate::clock::{Clock, SystemClock};
use crate::config::TelemetryConfig;
use crate::error::ErrorKind;
use crate::events::{UploadEvent, UploadEventBroadcaster};
use crate::ping::Ping;
use crate::quota::QuotaTracker;
use crate::queue::WorkQueue;
use crate::storage::PingStorage;
use crate::transport::{PingTransport, UploadOutcome};

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaltReason {
    /// No ready files existed for the category.
    NothingToUpload,
    /// Every ready record was resolved.
    Drained,
    /// The daily upload ceiling was reached.
    QuotaReached,
    /// An upload failed without a usable response; the record was kept.
    TransportFailed,
    /// Reading or writing storage failed.
    StorageFailed,
}

impl HaltReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NothingToUpload => "nothing_to_upload",
            Self::Drained => "drained",
            Self::QuotaReached => "quota_reached",
            Self::TransportFailed => "transport_failed",
            Self::StorageFailed => "storage_failed",
        }
    }
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub category: String,
    pub halt: HaltReason,
    /// Records removed after the collector answered.
    pub uploaded: usize,
    /// Records removed because their upload could never succeed.
    pub discarded: usize,
    /// Records removed because they could not be materialized.
    pub decode_failures: usize,
    /// Records still stored when the run stopped.
    pub remaining: usize,
}

impl RunReport {
    fn new(category: &str) -> Self {
        Self {
            category: category.to_string(),
            halt: HaltReason::NothingToUpload,
            uploaded: 0,
            discarded: 0,
            decode_failures: 0,
            remaining: 0,
        }
    }
}

enum Step {
    CheckQuota,
    NextRecord,
    Upload(Ping),
    Done(HaltReason),
}

/// Drains a category's ready pings through a transport.
pub struct UploadScheduler<S, T> {
    config: Arc<TelemetryConfig>,
    storage: Arc<S>,
    transport: Arc<T>,
    quota: QuotaTracker<S>,
    events: UploadEventBroadcaster,
}

impl<S, T> UploadScheduler<S, T>
where
    S: PingStorage,
    T: PingTransport,
{
    pub fn new(
        config: Arc<TelemetryConfig>,
        storage: Arc<S>,
        transport: Arc<T>,
        events: UploadEventBroadcaster,
    ) -> Self {
        let quota = QuotaTracker::new(storage.clone(), Arc::new(SystemClock));
        Self {
            config,
            storage,
            transport,
            quota,
            events,
        }
    }

    /// Use `clock` for quota windows instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.quota = QuotaTracker::new(self.storage.clone(), clock);
        self
    }

    pub fn quota(&self) -> &QuotaTracker<S> {
        &self.quota
    }

    /// Drain `category`, then call `on_complete` exactly once.
    pub async fn schedule_upload<F>(&self, category: &str, on_complete: F)
    where
        F: FnOnce(RunReport),
    {
        let report = self.run(category).await;
        on_complete(report);
    }

    /// Drain `category` and report how the run ended.
    pub async fn run(&self, category: &str) -> RunReport {
        let mut report = RunReport::new(category);

        let mut queue = match WorkQueue::load_ready(self.storage.as_ref(), category).await {
            Ok(queue) => queue,
            Err(e) => {
                warn!(category, error = %e, "Failed to load ready ping files");
                return self.finish(report, HaltReason::StorageFailed);
            }
        };

        let Some(mut current) = queue.pop_front() else {
            debug!(category, "No ping files ready for upload");
            return self.finish(report, HaltReason::NothingToUpload);
        };

        info!(
            category,
            files = queue.len() + 1,
            records = queue.pending_records() + current.records.len(),
            "Starting ping upload run"
        );

        let max_per_day = self.config.max_uploads_for(category);
        let mut step = Step::CheckQuota;

        let halt = loop {
            step = match step {
                Step::CheckQuota => match self.quota.has_reached_limit(category, max_per_day).await {
                    Ok(true) => {
                        info!(category, max_per_day, "Daily upload limit reached");
                        Step::Done(HaltReason::QuotaReached)
                    }
                    Ok(false) => Step::NextRecord,
                    Err(e) => self.storage_failed(category, "reading quota", e),
                },

                Step::NextRecord => match current.pop_record() {
                    Some(record) => match Ping::from_record(&record) {
                        Some(ping) => Step::Upload(ping),
                        None => {
                            report.decode_failures += 1;
                            warn!(category, file = %current.id, "Dropping malformed ping record");
                            self.events.publish(UploadEvent::upload_error(
                                category,
                                ErrorKind::CannotGeneratePing,
                                "Ping to JSON conversion failure.",
                            ));
                            match self.storage.write_or_delete(&current).await {
                                Ok(()) => Step::CheckQuota,
                                Err(e) => {
                                    report.remaining += 1;
                                    self.storage_failed(category, "persisting ping file", e)
                                }
                            }
                        }
                    },
                    None => match queue.pop_front() {
                        Some(next) => {
                            current = next;
                            Step::CheckQuota
                        }
                        None => Step::Done(HaltReason::Drained),
                    },
                },

                Step::Upload(ping) => {
                    let outcome = self.transport.upload(&ping).await;
                    self.report_upload_error(category, &ping, &outcome);

                    if !outcome.is_consumed() {
                        // The record was only popped in memory; the stored file still starts with it.
                        report.remaining += 1;
                        Step::Done(HaltReason::TransportFailed)
                    } else if let Err(e) = self.storage.write_or_delete(&current).await {
                        report.remaining += 1;
                        self.storage_failed(category, "persisting ping file", e)
                    } else {
                        if outcome.status >= 200 {
                            report.uploaded += 1;
                        } else {
                            report.discarded += 1;
                        }
                        match self.quota.record_upload(category).await {
                            Ok(()) => Step::CheckQuota,
                            Err(e) => self.storage_failed(category, "recording upload", e),
                        }
                    }
                }

                Step::Done(halt) => break halt,
            };
        };

        report.remaining += current.records.len() + queue.pending_records();
        self.finish(report, halt)
    }

    fn report_upload_error(&self, category: &str, ping: &Ping, outcome: &UploadOutcome) {
        let Some(error) = &outcome.error else {
            return;
        };

        debug!(
            category,
            document_id = %ping.document_id,
            kind = %error.kind,
            "Ping upload failed: {}",
            error.message
        );
        self.events.publish(UploadEvent::upload_error(
            category,
            error.kind,
            error.message.clone(),
        ));
    }

    fn storage_failed(&self, category: &str, op: &'static str, error: Error) -> Step {
        warn!(category, error = %error, "Storage failure while {}, stopping upload run", op);
        Step::Done(HaltReason::StorageFailed)
    }

    fn finish(&self, mut report: RunReport, halt: HaltReason) -> RunReport {
        report.halt = halt;
        if halt != HaltReason::NothingToUpload {
            info!(
                category = %report.category,
                halt = %halt,
                uploaded = report.uploaded,
                discarded = report.discarded,
                decode_failures = report.decode_failures,
                remaining = report.remaining,
                "Ping upload run finished"
            );
        }
        self.events.publish(UploadEvent::RunFinished {
            report: report.clone(),
            timestamp: Utc::now(),
        });
        report
    }
}

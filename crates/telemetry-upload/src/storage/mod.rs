//! Ping storage.
//!
//! Storage owns two things per category: the files of pending ping records
//! and a small key-value space the quota tracker keeps its counters in.
//!
//! A category accumulates records in a single in-progress file. Marking the
//! category ready seals that file; sealed ("ready") files are what the
//! scheduler drains, oldest first.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use std::collections::VecDeque;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;
use crate::ping::RawRecord;

/// Identifier of a ready file within its category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PingFileId(String);

impl PingFileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PingFileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A ready file and the records in it that are still pending upload.
#[derive(Debug, Clone)]
pub struct PingFile {
    pub id: PingFileId,
    pub category: String,
    pub records: VecDeque<RawRecord>,
}

impl PingFile {
    pub fn new(
        id: PingFileId,
        category: impl Into<String>,
        records: impl IntoIterator<Item = RawRecord>,
    ) -> Self {
        Self {
            id,
            category: category.into(),
            records: records.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn pop_record(&mut self) -> Option<RawRecord> {
        self.records.pop_front()
    }
}

/// Durable storage used by the uploader.
#[async_trait]
pub trait PingStorage: Send + Sync {
    /// Append a record to the category's in-progress file.
    async fn enqueue(&self, category: &str, record: RawRecord) -> Result<()>;

    /// Seal the category's in-progress file, if any, so it becomes ready.
    async fn mark_ready(&self, category: &str) -> Result<()>;

    /// All ready files of the category, oldest first.
    async fn read_all_ready(&self, category: &str) -> Result<Vec<PingFile>>;

    /// Persist the file's remaining records, deleting it once none remain.
    async fn write_or_delete(&self, file: &PingFile) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

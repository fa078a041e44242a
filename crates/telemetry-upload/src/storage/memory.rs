//! In-process ping storage.

use std::collections::{HashMap, VecDeque};
#[cfg(test)]
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{PingFile, PingFileId, PingStorage};
use crate::ping::RawRecord;
use crate::Result;

#[derive(Debug, Default)]
struct CategoryFiles {
    in_progress: Vec<RawRecord>,
    ready: Vec<(PingFileId, VecDeque<RawRecord>)>,
    next_seq: u64,
}

/// Storage that keeps everything in memory.
///
/// Same semantics as [`FileStorage`](super::FileStorage) without the
/// per-category file limit. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    categories: Mutex<HashMap<String, CategoryFiles>>,
    values: Mutex<HashMap<String, Value>>,
    #[cfg(test)]
    value_writes: AtomicUsize,
    #[cfg(test)]
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a ready file directly, bypassing the in-progress stage.
    pub fn insert_ready(
        &self,
        category: &str,
        records: impl IntoIterator<Item = RawRecord>,
    ) -> PingFileId {
        let mut categories = self.categories.lock();
        let files = categories.entry(category.to_string()).or_default();
        let id = PingFileId::new(format!("ready-{:06}", files.next_seq));
        files.next_seq += 1;
        files.ready.push((id.clone(), records.into_iter().collect()));
        id
    }

    /// Records of every ready file of the category, oldest file first.
    pub fn ready_records(&self, category: &str) -> Vec<Vec<RawRecord>> {
        self.categories
            .lock()
            .get(category)
            .map(|files| {
                files
                    .ready
                    .iter()
                    .map(|(_, records)| records.iter().cloned().collect())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Records waiting in the category's in-progress file.
    pub fn in_progress_records(&self, category: &str) -> Vec<RawRecord> {
        self.categories
            .lock()
            .get(category)
            .map(|files| files.in_progress.clone())
            .unwrap_or_default()
    }

    /// Number of key-value writes performed so far.
    #[cfg(test)]
    pub fn value_writes(&self) -> usize {
        self.value_writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent file and key-value write fail.
    #[cfg(test)]
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(crate::Error::storage("memory storage is read-only"));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_writable(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl PingStorage for MemoryStorage {
    async fn enqueue(&self, category: &str, record: RawRecord) -> Result<()> {
        self.check_writable()?;
        self.categories
            .lock()
            .entry(category.to_string())
            .or_default()
            .in_progress
            .push(record);
        Ok(())
    }

    async fn mark_ready(&self, category: &str) -> Result<()> {
        let records = {
            let mut categories = self.categories.lock();
            match categories.get_mut(category) {
                Some(files) if !files.in_progress.is_empty() => {
                    std::mem::take(&mut files.in_progress)
                }
                _ => return Ok(()),
            }
        };
        self.insert_ready(category, records);
        Ok(())
    }

    async fn read_all_ready(&self, category: &str) -> Result<Vec<PingFile>> {
        let categories = self.categories.lock();
        let Some(files) = categories.get(category) else {
            return Ok(Vec::new());
        };

        Ok(files
            .ready
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(id, records)| PingFile {
                id: id.clone(),
                category: category.to_string(),
                records: records.clone(),
            })
            .collect())
    }

    async fn write_or_delete(&self, file: &PingFile) -> Result<()> {
        self.check_writable()?;

        let mut categories = self.categories.lock();
        let Some(files) = categories.get_mut(&file.category) else {
            return Ok(());
        };

        if file.records.is_empty() {
            files.ready.retain(|(id, _)| *id != file.id);
        } else if let Some((_, records)) = files.ready.iter_mut().find(|(id, _)| *id == file.id) {
            *records = file.records.clone();
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.check_writable()?;
        self.values.lock().insert(key.to_string(), value);
        #[cfg(test)]
        self.value_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

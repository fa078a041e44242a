//! Work queue of ready ping files for one upload run.

use std::collections::VecDeque;

use crate::Result;
use crate::storage::{PingFile, PingStorage};

/// Ready files of one category, consumed strictly front to back.
#[derive(Debug, Default)]
pub struct WorkQueue {
    files: VecDeque<PingFile>,
}

impl WorkQueue {
    /// Seal the category's in-progress file, then load every ready file.
    ///
    /// Sealing first makes records written since the previous run part of
    /// this one.
    pub async fn load_ready<S>(storage: &S, category: &str) -> Result<Self>
    where
        S: PingStorage + ?Sized,
    {
        storage.mark_ready(category).await?;
        let files = storage.read_all_ready(category).await?;
        Ok(Self {
            files: files.into(),
        })
    }

    pub fn pop_front(&mut self) -> Option<PingFile> {
        self.files.pop_front()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Records left across all queued files.
    pub fn pending_records(&self) -> usize {
        self.files.iter().map(|file| file.records.len()).sum()
    }
}

impl From<Vec<PingFile>> for WorkQueue {
    fn from(files: Vec<PingFile>) -> Self {
        Self {
            files: files.into(),
        }
    }
}

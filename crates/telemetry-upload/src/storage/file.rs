//! Directory-backed ping storage.
//!
//! Layout under the root directory:
//!
//! ```text
//! values.json                      quota counters and other key-value entries
//! <category>/in-progress.jsonl     records enqueued since the last upload run
//! <category>/ready-<ms>-<seq>.jsonl sealed files, drained oldest first
//! ```
//!
//! Every file holds one JSON object per line.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{PingFile, PingFileId, PingStorage};
use crate::ping::RawRecord;
use crate::{Error, Result};

const IN_PROGRESS_FILE: &str = "in-progress.jsonl";
const READY_PREFIX: &str = "ready-";
const READY_SUFFIX: &str = ".jsonl";
const VALUES_FILE: &str = "values.json";

/// Ping storage rooted at a directory.
pub struct FileStorage {
    root: PathBuf,
    max_files_per_category: usize,
    sequence: AtomicU64,
    /// Serializes read-modify-write cycles on `values.json`.
    values_lock: Mutex<()>,
    /// Per-category locks over the in-progress and ready files, so an append
    /// never lands in a file after it was sealed or rewritten.
    category_locks: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileStorage {
    /// Open (and create if needed) storage rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>, max_files_per_category: usize) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        Ok(Self {
            root,
            max_files_per_category: max_files_per_category.max(1),
            sequence: AtomicU64::new(0),
            values_lock: Mutex::new(()),
            category_locks: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn category_dir(&self, category: &str) -> Result<PathBuf> {
        let valid = !category.is_empty()
            && category != "."
            && category != ".."
            && !category.contains(['/', '\\']);
        if !valid {
            return Err(Error::storage(format!(
                "invalid category name: {:?}",
                category
            )));
        }
        Ok(self.root.join(category))
    }

    fn category_lock(&self, category: &str) -> Arc<Mutex<()>> {
        self.category_locks
            .lock()
            .entry(category.to_string())
            .or_default()
            .clone()
    }

    fn next_ready_name(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}{:020}-{:06}{}",
            READY_PREFIX,
            Utc::now().timestamp_millis().max(0),
            seq,
            READY_SUFFIX
        )
    }

    /// Names of the category's ready files, oldest first.
    async fn ready_file_names(&self, dir: &Path) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(READY_PREFIX) && name.ends_with(READY_SUFFIX) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Drop the oldest ready files beyond the configured limit.
    async fn enforce_file_limit(&self, category: &str, dir: &Path) -> Result<()> {
        let names = self.ready_file_names(dir).await?;
        if names.len() <= self.max_files_per_category {
            return Ok(());
        }

        let excess = names.len() - self.max_files_per_category;
        for name in &names[..excess] {
            warn!(category, file = %name, "Dropping ready ping file over the per-category limit");
            remove_if_exists(&dir.join(name)).await?;
        }
        Ok(())
    }

    async fn load_values(&self) -> Result<Map<String, Value>> {
        let path = self.root.join(VALUES_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(json) if json.trim().is_empty() => Ok(Map::new()),
            Ok(json) => match serde_json::from_str(&json) {
                Ok(values) => Ok(values),
                Err(e) => {
                    // Rewritten on the next `set`.
                    warn!(path = %path.display(), error = %e, "Ignoring unreadable values file");
                    Ok(Map::new())
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl PingStorage for FileStorage {
    async fn enqueue(&self, category: &str, record: RawRecord) -> Result<()> {
        let dir = self.category_dir(category)?;
        tokio::fs::create_dir_all(&dir).await?;

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let lock = self.category_lock(category);
        let _guard = lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(IN_PROGRESS_FILE))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(category, "Enqueued ping record");
        Ok(())
    }

    async fn mark_ready(&self, category: &str) -> Result<()> {
        let dir = self.category_dir(category)?;
        let in_progress = dir.join(IN_PROGRESS_FILE);

        let lock = self.category_lock(category);
        let _guard = lock.lock().await;
        let ready_name = self.next_ready_name();
        match tokio::fs::rename(&in_progress, dir.join(&ready_name)).await {
            Ok(()) => debug!(category, file = %ready_name, "Marked in-progress ping file ready"),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        self.enforce_file_limit(category, &dir).await
    }

    async fn read_all_ready(&self, category: &str) -> Result<Vec<PingFile>> {
        let dir = self.category_dir(category)?;
        let mut files = Vec::new();

        for name in self.ready_file_names(&dir).await? {
            let path = dir.join(&name);
            let contents = match tokio::fs::read_to_string(&path).await {
                Ok(contents) => contents,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            let records = parse_records(category, &name, &contents);
            if records.is_empty() {
                remove_if_exists(&path).await?;
                continue;
            }

            files.push(PingFile::new(PingFileId::new(name), category, records));
        }

        Ok(files)
    }

    async fn write_or_delete(&self, file: &PingFile) -> Result<()> {
        let path = self.category_dir(&file.category)?.join(file.id.as_str());

        let lock = self.category_lock(&file.category);
        let _guard = lock.lock().await;
        if file.records.is_empty() {
            debug!(category = %file.category, file = %file.id, "Deleting drained ping file");
            return remove_if_exists(&path).await;
        }

        let mut contents = String::new();
        for record in &file.records {
            contents.push_str(&serde_json::to_string(record)?);
            contents.push('\n');
        }

        let temp_path = path.with_extension("jsonl.tmp");
        tokio::fs::write(&temp_path, contents).await?;
        tokio::fs::rename(&temp_path, &path).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.values_lock.lock().await;
        Ok(self.load_values().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.values_lock.lock().await;

        let mut values = self.load_values().await?;
        values.insert(key.to_string(), value);

        let path = self.root.join(VALUES_FILE);
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, serde_json::to_string_pretty(&values)?).await?;
        tokio::fs::rename(&temp_path, &path).await?;
        Ok(())
    }
}

fn parse_records(category: &str, file: &str, contents: &str) -> Vec<RawRecord> {
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<RawRecord>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(category, file, error = %e, "Skipping unreadable line in ping file");
                None
            }
        })
        .collect()
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

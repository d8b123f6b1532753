//! In-memory test doubles for the storage and sink seams
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tabload::loader::TableBatch;
use tabload::storage::staged_path;
use tabload::{FetchError, LoadError, ObjectRef, ObjectStore, StagedFile, StorageError, StorageLocation, TableSink};
use tokio_util::sync::CancellationToken;

/// Object store holding keys and bytes in listing order
#[derive(Default)]
pub struct MemoryStore {
    objects: Vec<(String, Option<Vec<u8>>)>,
    delays: HashMap<String, Duration>,
    fail_list: bool,
    cancel_on_fetch: Option<CancellationToken>,
    pub list_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub fetch_dirs: Mutex<Vec<PathBuf>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, key: &str, content: &[u8]) -> Self {
        self.objects.push((key.to_string(), Some(content.to_vec())));
        self
    }

    /// Listed, but gone by the time it is fetched
    pub fn with_missing(mut self, key: &str) -> Self {
        self.objects.push((key.to_string(), None));
        self
    }

    pub fn with_delay(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.to_string(), delay);
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    /// Cancel `token` as soon as the first fetch starts
    pub fn cancel_on_fetch(mut self, token: CancellationToken) -> Self {
        self.cancel_on_fetch = Some(token);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list(&self, location: &StorageLocation) -> Result<Vec<ObjectRef>, StorageError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list {
            return Err(StorageError::List {
                bucket: location.bucket.clone(),
                prefix: location.prefix.clone(),
                message: "NoSuchBucket".to_string(),
            });
        }

        Ok(self
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(&location.prefix))
            .map(|(key, content)| ObjectRef {
                key: key.clone(),
                size: content.as_ref().map(|c| c.len() as i64),
            })
            .collect())
    }

    async fn fetch(
        &self,
        _bucket: &str,
        object: ObjectRef,
        destination_dir: &Path,
    ) -> Result<StagedFile, FetchError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetch_dirs.lock().unwrap().push(destination_dir.to_path_buf());

        if let Some(token) = &self.cancel_on_fetch {
            token.cancel();
        }
        if let Some(delay) = self.delays.get(&object.key) {
            tokio::time::sleep(*delay).await;
        }

        let content = self
            .objects
            .iter()
            .find(|(key, _)| *key == object.key)
            .and_then(|(_, content)| content.clone())
            .ok_or_else(|| FetchError::NotFound {
                key: object.key.clone(),
            })?;

        let path = staged_path(&object, destination_dir)?;
        tokio::fs::write(&path, &content)
            .await
            .map_err(|source| FetchError::LocalWrite {
                path: path.clone(),
                source,
            })?;

        Ok(StagedFile {
            source_key: object.key,
            local_path: path,
            bytes_written: content.len() as u64,
        })
    }
}

/// Sink that keeps the latest batch per table name
#[derive(Default)]
pub struct RecordingSink {
    tables: Mutex<HashMap<String, TableBatch>>,
    failing: HashSet<String>,
    pub replace_calls: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_table(mut self, table: &str) -> Self {
        self.failing.insert(table.to_string());
        self
    }

    pub fn table(&self, name: &str) -> Option<TableBatch> {
        self.tables.lock().unwrap().get(name).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tables.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn replaces(&self) -> usize {
        self.replace_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TableSink for RecordingSink {
    async fn replace_table(&self, batch: &TableBatch) -> Result<u64, LoadError> {
        self.replace_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&batch.name) {
            return Err(LoadError::Rejected {
                table: batch.name.clone(),
                reason: "table is read-only".to_string(),
            });
        }

        self.tables
            .lock()
            .unwrap()
            .insert(batch.name.clone(), batch.clone());
        Ok(batch.row_count() as u64)
    }
}

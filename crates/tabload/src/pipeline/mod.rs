//! Run orchestration
//!
//! One run lists the configured location, then drives every object through
//! fetch → parse → load. A failure in any stage is recorded against that
//! object and the run moves on; only configuration, staging-directory and
//! listing failures end a run early.
//!
//! With `concurrency > 1` several objects are in flight at once. Results are
//! still folded into the [`RunResult`] in listing order, and each object is
//! staged into its own subdirectory so equal basenames cannot clobber each
//! other.

use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{FetchError, FileError, ParseError, RunError, Stage};
use crate::loader::{TableSink, TabularLoader};
use crate::storage::{ObjectRef, ObjectStore, StorageLocation};

pub mod result;

pub use result::{FailedFile, FileOutcome, RunAccumulator, RunResult, RunStatus};

/// Run-level settings
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub location: StorageLocation,
    pub staging_directory: PathBuf,
    /// Objects in flight at once; `0` is treated as `1`
    pub concurrency: usize,
    /// How long in-flight objects may keep running after cancellation
    pub shutdown_grace: Duration,
    pub remove_staged_files: bool,
}

impl PipelineOptions {
    pub fn new(location: StorageLocation, staging_directory: impl Into<PathBuf>) -> Self {
        Self {
            location,
            staging_directory: staging_directory.into(),
            concurrency: 1,
            shutdown_grace: Duration::from_secs(30),
            remove_staged_files: false,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_remove_staged_files(mut self, remove: bool) -> Self {
        self.remove_staged_files = remove;
        self
    }
}

/// Storage → loader → sink orchestrator
pub struct Pipeline {
    options: PipelineOptions,
    loader: TabularLoader,
    store: Arc<dyn ObjectStore>,
    sink: Arc<dyn TableSink>,
}

impl Pipeline {
    pub fn new(
        options: PipelineOptions,
        loader: TabularLoader,
        store: Arc<dyn ObjectStore>,
        sink: Arc<dyn TableSink>,
    ) -> Self {
        Self {
            options,
            loader,
            store,
            sink,
        }
    }

    /// Execute one run
    ///
    /// Cancelling `cancel` stops dispatch of further objects. Objects already
    /// in flight get `shutdown_grace` to finish before they are abandoned and
    /// recorded as cancelled.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunResult, RunError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, location = %self.options.location);
        self.execute(run_id, cancel).instrument(span).await
    }

    async fn execute(&self, run_id: Uuid, cancel: CancellationToken) -> Result<RunResult, RunError> {
        let mut acc = RunAccumulator::new(run_id);
        let concurrency = self.options.concurrency.max(1);
        info!(state = "init", concurrency, "Starting run");

        let staging = &self.options.staging_directory;
        tokio::fs::create_dir_all(staging)
            .await
            .map_err(|source| RunError::Staging {
                path: staging.clone(),
                source,
            })?;

        info!(state = "listing", "Listing objects");
        let objects = match self.store.list(&self.options.location).await {
            Ok(objects) => objects,
            Err(e) => {
                error!(state = "failed", error = %e, "Listing failed");
                return Err(e.into());
            },
        };
        acc.set_listed(objects.len());

        if objects.is_empty() {
            info!(state = "empty", "No objects found");
            return Ok(acc.finish(RunStatus::Empty));
        }

        if let Some(max) = self.sink.max_connections() {
            if (max as usize) < concurrency {
                warn!(
                    max_connections = max,
                    concurrency, "Sink pool is smaller than concurrency; loads will queue"
                );
            }
        }

        info!(state = "processing", objects = objects.len(), "Processing objects");

        let outcomes = stream::iter(objects.into_iter().enumerate())
            .take_until(cancel.clone().cancelled_owned())
            .map(|(ordinal, object)| self.process_with_grace(ordinal, object, concurrency, &cancel))
            .buffered(concurrency);
        let mut outcomes = std::pin::pin!(outcomes);

        while let Some(outcome) = outcomes.next().await {
            acc.record(outcome);
        }

        let status = acc.processing_status();
        let result = acc.finish(status);
        info!(
            state = %status,
            attempted = result.attempted(),
            loaded = result.loaded().len(),
            failed = result.failed().len(),
            "{}",
            result.summary()
        );
        Ok(result)
    }

    /// Race one object against cancellation plus the grace period
    async fn process_with_grace(
        &self,
        ordinal: usize,
        object: ObjectRef,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> FileOutcome {
        let source_key = object.key.clone();
        let tracker = StageTracker::default();
        let grace = self.options.shutdown_grace;

        let deadline = async {
            cancel.cancelled().await;
            tokio::time::sleep(grace).await;
        };

        tokio::select! {
            biased;
            outcome = self.process(ordinal, object, concurrency, &tracker) => outcome,
            () = deadline => {
                let stage = tracker.get();
                warn!(key = %source_key, %stage, "Abandoned after shutdown grace period");
                FileOutcome::Failed {
                    source_key,
                    error: FileError::Cancelled(stage),
                }
            }
        }
    }

    async fn process(
        &self,
        ordinal: usize,
        object: ObjectRef,
        concurrency: usize,
        tracker: &StageTracker,
    ) -> FileOutcome {
        let source_key = object.key.clone();
        let span = info_span!("file", key = %source_key);

        let processed = self
            .fetch_parse_load(ordinal, object, concurrency, tracker)
            .instrument(span)
            .await;
        if self.options.remove_staged_files && concurrency > 1 {
            remove_staging_subdir(&self.staging_subdir(ordinal)).await;
        }

        match processed {
            Ok((table, rows)) => {
                info!(key = %source_key, %table, rows, "Loaded");
                FileOutcome::Loaded {
                    source_key,
                    table,
                    rows,
                }
            },
            Err(error) => {
                warn!(
                    key = %source_key,
                    stage = %error.stage(),
                    error = %error,
                    "File failed, continuing with next"
                );
                FileOutcome::Failed { source_key, error }
            },
        }
    }

    async fn fetch_parse_load(
        &self,
        ordinal: usize,
        object: ObjectRef,
        concurrency: usize,
        tracker: &StageTracker,
    ) -> Result<(String, u64), FileError> {
        tracker.set(Stage::Fetch);
        let destination = self.staging_dir_for(ordinal, concurrency).await?;
        let staged = self
            .store
            .fetch(&self.options.location.bucket, object, &destination)
            .await?;
        debug!(path = %staged.local_path.display(), bytes = staged.bytes_written, "Staged");

        tracker.set(Stage::Parse);
        let loader = self.loader.clone();
        let to_parse = staged.clone();
        let parsed = tokio::task::spawn_blocking(move || loader.parse(&to_parse))
            .await
            .map_err(|e| ParseError::Task(e.to_string()))?;

        if self.options.remove_staged_files {
            remove_staged(&staged.local_path).await;
        }
        let batch = parsed?;

        tracker.set(Stage::Load);
        let rows = self.loader.load(&batch, self.sink.as_ref()).await?;
        Ok((batch.name, rows))
    }

    async fn staging_dir_for(&self, ordinal: usize, concurrency: usize) -> Result<PathBuf, FetchError> {
        let base = &self.options.staging_directory;
        if concurrency <= 1 {
            return Ok(base.clone());
        }

        let dir = self.staging_subdir(ordinal);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| FetchError::LocalWrite {
                path: dir.clone(),
                source,
            })?;
        Ok(dir)
    }

    fn staging_subdir(&self, ordinal: usize) -> PathBuf {
        self.options.staging_directory.join(format!("{:05}", ordinal))
    }
}

async fn remove_staged(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove staged file");
    }
}

async fn remove_staging_subdir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {},
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => warn!(path = %dir.display(), error = %e, "Failed to remove staging subdirectory"),
    }
}

/// Current stage of one in-flight object
#[derive(Debug, Default)]
struct StageTracker(AtomicU8);

impl StageTracker {
    fn set(&self, stage: Stage) {
        let raw = match stage {
            Stage::Fetch => 0,
            Stage::Parse => 1,
            Stage::Load => 2,
        };
        self.0.store(raw, Ordering::Relaxed);
    }

    fn get(&self) -> Stage {
        match self.0.load(Ordering::Relaxed) {
            0 => Stage::Fetch,
            1 => Stage::Parse,
            _ => Stage::Load,
        }
    }
}

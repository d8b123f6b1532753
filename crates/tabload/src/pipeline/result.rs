//! Per-file outcomes and the run summary they fold into

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{FileError, Stage};

/// Terminal state of a run that got past listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Listing returned no objects
    Empty,
    /// Every listed object was attempted
    Completed,
    /// Cancellation left objects undispatched or abandoned in flight
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Empty => f.write_str("empty"),
            RunStatus::Completed => f.write_str("completed"),
            RunStatus::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Result of one fetch → parse → load attempt
#[derive(Debug)]
pub enum FileOutcome {
    Loaded {
        source_key: String,
        table: String,
        rows: u64,
    },
    Failed {
        source_key: String,
        error: FileError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub source_key: String,
    pub stage: Stage,
    pub reason: String,
}

/// Summary of a run; built by [`RunAccumulator::finish`]
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    run_id: Uuid,
    status: RunStatus,
    listed: usize,
    attempted: usize,
    loaded: Vec<String>,
    failed: Vec<FailedFile>,
    rows_written: u64,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Objects returned by listing
    pub fn listed(&self) -> usize {
        self.listed
    }

    /// Objects dispatched for processing
    pub fn attempted(&self) -> usize {
        self.attempted
    }

    /// Loaded table names, in listing order
    pub fn loaded(&self) -> &[String] {
        &self.loaded
    }

    pub fn failed(&self) -> &[FailedFile] {
        &self.failed
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn summary(&self) -> String {
        match self.status {
            RunStatus::Empty => "No objects found; nothing loaded".to_string(),
            status => format!(
                "Run {}: {} listed, {} attempted, {} loaded ({} rows), {} failed",
                status,
                self.listed,
                self.attempted,
                self.loaded.len(),
                self.rows_written,
                self.failed.len()
            ),
        }
    }
}

/// Single-writer accumulator owned by the run loop
#[derive(Debug)]
pub struct RunAccumulator {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    listed: usize,
    attempted: usize,
    loaded: Vec<String>,
    failed: Vec<FailedFile>,
    rows_written: u64,
    abandoned: usize,
}

impl RunAccumulator {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            listed: 0,
            attempted: 0,
            loaded: Vec::new(),
            failed: Vec::new(),
            rows_written: 0,
            abandoned: 0,
        }
    }

    pub fn set_listed(&mut self, listed: usize) {
        self.listed = listed;
    }

    pub fn record(&mut self, outcome: FileOutcome) {
        self.attempted += 1;
        match outcome {
            FileOutcome::Loaded { table, rows, .. } => {
                self.rows_written += rows;
                self.loaded.push(table);
            },
            FileOutcome::Failed { source_key, error } => {
                if matches!(error, FileError::Cancelled(_)) {
                    self.abandoned += 1;
                }
                let reason = match error.to_string() {
                    reason if reason.trim().is_empty() => format!("{} failed", error.stage()),
                    reason => reason,
                };
                self.failed.push(FailedFile {
                    source_key,
                    stage: error.stage(),
                    reason,
                });
            },
        }
    }

    /// `Cancelled` if any listed object was never dispatched or was
    /// abandoned mid-flight, otherwise `Completed`
    pub fn processing_status(&self) -> RunStatus {
        if self.attempted < self.listed || self.abandoned > 0 {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        }
    }

    pub fn finish(self, status: RunStatus) -> RunResult {
        RunResult {
            run_id: self.run_id,
            status,
            listed: self.listed,
            attempted: self.attempted,
            loaded: self.loaded,
            failed: self.failed,
            rows_written: self.rows_written,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::{FetchError, ParseError};

    #[test]
    fn test_accumulator_counts() {
        let mut acc = RunAccumulator::new(Uuid::new_v4());
        acc.set_listed(3);
        acc.record(FileOutcome::Loaded {
            source_key: "q/a.csv".into(),
            table: "table_from_a".into(),
            rows: 3,
        });
        acc.record(FileOutcome::Failed {
            source_key: "q/b.csv".into(),
            error: ParseError::Empty { path: "/tmp/b.csv".into() }.into(),
        });
        acc.record(FileOutcome::Failed {
            source_key: "q/c.csv".into(),
            error: FetchError::NotFound { key: "q/c.csv".into() }.into(),
        });

        let result = acc.finish(RunStatus::Completed);
        assert_eq!(result.attempted(), 3);
        assert_eq!(result.loaded(), ["table_from_a".to_string()]);
        assert_eq!(result.failed().len(), 2);
        assert_eq!(result.failed()[0].stage, Stage::Parse);
        assert_eq!(result.failed()[1].stage, Stage::Fetch);
        assert_eq!(result.rows_written(), 3);
        assert!(!result.is_success());
        assert!(result.finished_at() >= result.started_at());
    }

    #[test]
    fn test_processing_status() {
        let mut acc = RunAccumulator::new(Uuid::new_v4());
        acc.set_listed(2);
        acc.record(FileOutcome::Loaded {
            source_key: "q/a.csv".into(),
            table: "table_from_a".into(),
            rows: 1,
        });
        assert_eq!(acc.processing_status(), RunStatus::Cancelled);

        acc.record(FileOutcome::Loaded {
            source_key: "q/b.csv".into(),
            table: "table_from_b".into(),
            rows: 1,
        });
        assert_eq!(acc.processing_status(), RunStatus::Completed);
    }

    #[test]
    fn test_abandoned_file_marks_run_cancelled() {
        let mut acc = RunAccumulator::new(Uuid::new_v4());
        acc.set_listed(1);
        acc.record(FileOutcome::Failed {
            source_key: "q/slow.csv".into(),
            error: FileError::Cancelled(Stage::Load),
        });
        assert_eq!(acc.attempted, 1);
        assert_eq!(acc.processing_status(), RunStatus::Cancelled);
    }

    #[test]
    fn test_empty_summary() {
        let result = RunAccumulator::new(Uuid::new_v4()).finish(RunStatus::Empty);
        assert_eq!(result.attempted(), 0);
        assert!(result.is_success());
        assert_eq!(result.summary(), "No objects found; nothing loaded");
    }

    #[test]
    fn test_serializes_to_json() {
        let mut acc = RunAccumulator::new(Uuid::new_v4());
        acc.set_listed(1);
        acc.record(FileOutcome::Failed {
            source_key: "q/b.csv".into(),
            error: ParseError::Empty { path: "/tmp/b.csv".into() }.into(),
        });
        let json = serde_json::to_value(acc.finish(RunStatus::Completed)).unwrap();

        assert_eq!(json["status"], "completed");
        assert_eq!(json["attempted"], 1);
        assert_eq!(json["failed"][0]["stage"], "parse");
        assert_eq!(json["failed"][0]["source_key"], "q/b.csv");
    }
}

//! Error taxonomy for a load run
//!
//! `ConfigError` and `StorageError` are fatal for a run. `FetchError`,
//! `ParseError` and `LoadError` belong to a single file and never cross the
//! per-file boundary: the orchestrator wraps them in [`FileError`] and
//! records them in the run result.

use std::path::PathBuf;
use thiserror::Error;

/// Malformed configuration, raised before any I/O
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid storage location '{location}': {reason}")]
    InvalidLocation { location: String, reason: &'static str },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {setting}: {reason}")]
    Invalid { setting: &'static str, reason: String },

    #[error("Failed to read configuration: {0}")]
    Source(#[from] ::config::ConfigError),
}

/// Listing failure
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to list s3://{bucket}/{prefix}: {message}")]
    List {
        bucket: String,
        prefix: String,
        message: String,
    },
}

/// Retrieval failure for one object
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("Access denied to object: {key}")]
    AccessDenied { key: String },

    #[error("Transfer of {key} failed: {message}")]
    Transfer { key: String, message: String },

    #[error("Failed to write {}: {source}", path.display())]
    LocalWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Object key '{key}' has no file name")]
    NoFileName { key: String },
}

/// Malformed or unreadable tabular content
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File is empty: {}", path.display())]
    Empty { path: PathBuf },

    #[error("Malformed tabular content in {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Parser task failed: {0}")]
    Task(String),
}

/// Sink write failure
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to connect to sink: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("Failed to replace table {table}: {source}")]
    Write {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Table {table} rejected: {reason}")]
    Rejected { table: String, reason: String },
}

/// Pipeline step a file failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Parse,
    Load,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Fetch => f.write_str("fetch"),
            Stage::Parse => f.write_str("parse"),
            Stage::Load => f.write_str("load"),
        }
    }
}

/// Per-file failure, isolated by the orchestrator
#[derive(Error, Debug)]
pub enum FileError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Cancelled during {0}")]
    Cancelled(Stage),
}

impl FileError {
    pub fn stage(&self) -> Stage {
        match self {
            FileError::Fetch(_) => Stage::Fetch,
            FileError::Parse(_) => Stage::Parse,
            FileError::Load(_) => Stage::Load,
            FileError::Cancelled(stage) => *stage,
        }
    }
}

/// Fatal errors that end a run early
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to prepare staging directory {}: {source}", path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

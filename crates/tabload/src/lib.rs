//! tabload
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Loads every delimited text file under an S3 location into MySQL, one
//! table per file, replacing any previous table of the same name.
//!
//! # Overview
//!
//! - **Storage**: [`storage::ObjectStore`] lists and stages objects; [`storage::S3Store`] is the S3 client
//! - **Loader**: [`loader::TabularLoader`] parses staged files into typed [`loader::TableBatch`]es
//! - **Sink**: [`loader::TableSink`] replaces tables; [`loader::MySqlSink`] writes through `sqlx`
//! - **Pipeline**: [`pipeline::Pipeline`] drives fetch → parse → load per file and isolates failures
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tabload::{Config, MySqlSink, Pipeline, S3Store};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load(None)?;
//! let store = Arc::new(S3Store::new(&config.storage).await);
//! let sink = Arc::new(MySqlSink::connect_lazy(&config.sink));
//!
//! let pipeline = Pipeline::new(config.pipeline_options()?, config.loader()?, store, sink);
//! let result = pipeline.run(CancellationToken::new()).await?;
//! println!("{}", result.summary());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod storage;

pub use config::{Config, SinkConfig};
pub use error::{ConfigError, FetchError, FileError, LoadError, ParseError, RunError, Stage, StorageError};
pub use loader::{derive_table_name, MySqlSink, TableBatch, TableSink, TabularLoader};
pub use pipeline::{Pipeline, PipelineOptions, RunResult, RunStatus};
pub use storage::{ObjectRef, ObjectStore, S3Store, StagedFile, StorageLocation};

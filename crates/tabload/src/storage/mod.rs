//! Object listing and retrieval
//!
//! [`ObjectStore`] is the seam between the pipeline and a concrete
//! object-storage provider. [`S3Store`] is the production implementation.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::{FetchError, StorageError};

pub mod config;
pub mod location;
pub mod s3;

pub use config::StorageConfig;
pub use location::StorageLocation;
pub use s3::S3Store;

/// A remote object returned by listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectRef {
    pub key: String,
    /// Size reported by the provider, if any
    pub size: Option<i64>,
}

impl ObjectRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size: None,
        }
    }

    /// Last `/`-separated segment of the key
    pub fn basename(&self) -> &str {
        basename(&self.key)
    }
}

/// A fetched object on local disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub source_key: String,
    pub local_path: PathBuf,
    pub bytes_written: u64,
}

/// List + get capability of an object-storage provider
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Enumerate objects under `location.prefix`. An empty listing is not an error.
    async fn list(&self, location: &StorageLocation) -> Result<Vec<ObjectRef>, StorageError>;

    /// Download `object` into `destination_dir/<basename(key)>`
    ///
    /// An existing file at that path is overwritten.
    async fn fetch(
        &self,
        bucket: &str,
        object: ObjectRef,
        destination_dir: &Path,
    ) -> Result<StagedFile, FetchError>;
}

pub fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Local path an object is staged at
pub fn staged_path(object: &ObjectRef, destination_dir: &Path) -> Result<PathBuf, FetchError> {
    let name = object.basename();
    if name.is_empty() || name == "." || name == ".." {
        return Err(FetchError::NoFileName {
            key: object.key.clone(),
        });
    }
    Ok(destination_dir.join(name))
}

/// Directory placeholder keys created by consoles and sync tools
pub(crate) fn is_directory_marker(key: &str) -> bool {
    key.ends_with('/')
}

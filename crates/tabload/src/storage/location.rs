//! Storage location parsing
//!
//! A location string is split on `/` positionally:
//!
//! ```text
//! s3://querys-hoteles/exports/2024/
//! ^^^  ^^^^^^^^^^^^^^ ^^^^^^^^^^^^^
//! scheme   bucket        prefix
//! ```
//!
//! No escaping or URL-decoding is applied.

use serde::Serialize;
use std::str::FromStr;

use crate::error::ConfigError;

/// Bucket plus key prefix, parsed once at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageLocation {
    pub bucket: String,
    /// May be empty, which matches every key in the bucket
    pub prefix: String,
}

impl StorageLocation {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    pub fn parse(location: &str) -> Result<Self, ConfigError> {
        let invalid = |reason| ConfigError::InvalidLocation {
            location: location.to_string(),
            reason,
        };

        let parts: Vec<&str> = location.split('/').collect();

        // "scheme:" followed by the empty segment between the two slashes
        let has_scheme = parts.len() >= 2
            && parts[0].len() > 1
            && parts[0].ends_with(':')
            && parts[1].is_empty();
        if !has_scheme {
            return Err(invalid("missing scheme separator '://'"));
        }

        let bucket = parts.get(2).copied().unwrap_or_default();
        if bucket.is_empty() {
            return Err(invalid("missing bucket segment"));
        }

        let prefix = parts.get(3..).map(|rest| rest.join("/")).unwrap_or_default();

        Ok(Self::new(bucket, prefix))
    }
}

impl FromStr for StorageLocation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.prefix)
    }
}

use serde::{Deserialize, Serialize};

/// Default region when none is configured or discoverable.
pub const DEFAULT_REGION: &str = "us-east-1";

/// S3 client settings
///
/// Keys are optional: when either is missing the AWS default credential
/// chain (environment, profile, instance metadata) is used instead.
#[derive(Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub region: Option<String>,
    /// Custom endpoint, e.g. a MinIO server
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
}

impl StorageConfig {
    pub fn for_minio(endpoint: impl Into<String>) -> Self {
        Self {
            region: Some(DEFAULT_REGION.to_string()),
            endpoint: Some(endpoint.into()),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            path_style: true,
        }
    }

    pub(crate) fn static_credentials(&self) -> Option<(&str, &str)> {
        match (self.access_key.as_deref(), self.secret_key.as_deref()) {
            (Some(access), Some(secret)) if !access.is_empty() && !secret.is_empty() => {
                Some((access, secret))
            },
            _ => None,
        }
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key.as_ref().map(|_| "<set>"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("path_style", &self.path_style)
            .finish()
    }
}

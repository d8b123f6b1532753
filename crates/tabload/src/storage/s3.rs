use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::{DisplayErrorContext, SdkError},
    operation::get_object::GetObjectError,
    Client,
};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use super::config::{StorageConfig, DEFAULT_REGION};
use super::{is_directory_marker, staged_path, ObjectRef, ObjectStore, StagedFile, StorageLocation};
use crate::error::{FetchError, StorageError};

/// [`ObjectStore`] backed by S3 or an S3-compatible server
#[derive(Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub async fn new(config: &StorageConfig) -> Self {
        debug!("Initializing S3 client with config: {:?}", config);

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some((access_key, secret_key)) = config.static_credentials() {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "tabload-static",
            ));
        }
        let shared = loader.load().await;

        let mut builder =
            aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.path_style);
        if shared.region().is_none() {
            builder = builder.region(Region::new(DEFAULT_REGION));
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(
            endpoint = config.endpoint.as_deref().unwrap_or("aws"),
            "S3 client initialized"
        );

        Self::from_client(Client::from_conf(builder.build()))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    #[instrument(skip(self), fields(bucket = %location.bucket, prefix = %location.prefix))]
    async fn list(&self, location: &StorageLocation) -> Result<Vec<ObjectRef>, StorageError> {
        let prefix = (!location.prefix.is_empty()).then(|| location.prefix.clone());
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&location.bucket)
                .set_prefix(prefix.clone())
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| StorageError::List {
                    bucket: location.bucket.clone(),
                    prefix: location.prefix.clone(),
                    message: DisplayErrorContext(&e).to_string(),
                })?;
            pages += 1;

            for object in response.contents() {
                let Some(key) = object.key() else { continue };
                if is_directory_marker(key) {
                    debug!(key, "Skipping directory marker");
                    continue;
                }
                objects.push(ObjectRef {
                    key: key.to_string(),
                    size: object.size(),
                });
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                },
                _ => break,
            }
        }

        debug!(objects = objects.len(), pages, "Listing complete");
        Ok(objects)
    }

    #[instrument(skip(self, destination_dir), fields(key = %object.key))]
    async fn fetch(
        &self,
        bucket: &str,
        object: ObjectRef,
        destination_dir: &Path,
    ) -> Result<StagedFile, FetchError> {
        let path = staged_path(&object, destination_dir)?;

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(&object.key)
            .send()
            .await
            .map_err(|e| classify_get_error(&object.key, e))?;

        let local_write = |source| FetchError::LocalWrite {
            path: path.clone(),
            source,
        };

        let mut body = response.body;
        let mut file = tokio::fs::File::create(&path).await.map_err(local_write)?;
        let mut bytes_written = 0u64;

        while let Some(chunk) = body.try_next().await.map_err(|e| FetchError::Transfer {
            key: object.key.clone(),
            message: e.to_string(),
        })? {
            file.write_all(&chunk).await.map_err(local_write)?;
            bytes_written += chunk.len() as u64;
        }
        file.flush().await.map_err(local_write)?;

        debug!(bytes_written, path = %path.display(), "Downloaded s3://{}/{}", bucket, object.key);

        Ok(StagedFile {
            source_key: object.key,
            local_path: path,
            bytes_written,
        })
    }
}

fn classify_get_error(key: &str, err: SdkError<GetObjectError>) -> FetchError {
    if let SdkError::ServiceError(service) = &err {
        if service.err().is_no_such_key() {
            return FetchError::NotFound { key: key.to_string() };
        }
    }

    match err.raw_response().map(|r| r.status().as_u16()) {
        Some(404) => FetchError::NotFound { key: key.to_string() },
        Some(403) => FetchError::AccessDenied { key: key.to_string() },
        _ => FetchError::Transfer {
            key: key.to_string(),
            message: DisplayErrorContext(&err).to_string(),
        },
    }
}

use std::path::Path;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::StorageClass;
use tracing::debug;

use crate::{ObjectStore, StoreError, object_key};

/// Connection overrides; everything unset falls back to the AWS default
/// provider chain (environment, profile, instance metadata).
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub region: Option<String>,
    pub endpoint: Option<String>,
    /// Needed by most S3-compatible servers (MinIO, Garage).
    pub force_path_style: bool,
}

pub struct S3Store {
    client: Client,
}

impl S3Store {
    /// Loads the shared AWS configuration. Fails when no region or no
    /// credentials provider can be resolved, since every upload would fail.
    pub async fn connect(settings: &S3Settings) -> Result<Self, StoreError> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &settings.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;
        check_shared_config(&shared)?;

        let conf = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(settings.force_path_style)
            .build();
        Ok(Self {
            client: Client::from_conf(conf),
        })
    }
}

fn check_shared_config(shared: &SdkConfig) -> Result<(), StoreError> {
    if shared.region().is_none() {
        return Err(StoreError::Config(
            "no AWS region (set s3.region or AWS_REGION)".to_string(),
        ));
    }
    if shared.credentials_provider().is_none() {
        return Err(StoreError::Config("no AWS credentials provider".to_string()));
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(
        &self,
        local_file: &Path,
        bucket: &str,
        prefix: &str,
        storage_class: &str,
    ) -> Result<(), StoreError> {
        let name = local_file
            .file_name()
            .ok_or_else(|| StoreError::NoFileName(local_file.to_path_buf()))?
            .to_string_lossy();
        let key = object_key(prefix, &name);

        let body = ByteStream::from_path(local_file)
            .await
            .map_err(|err| StoreError::Read {
                path: local_file.display().to_string(),
                message: err.to_string(),
            })?;

        debug!("uploading {} to s3://{}/{}", local_file.display(), bucket, key);
        self.client
            .put_object()
            .bucket(bucket)
            .key(&key)
            .storage_class(StorageClass::from(storage_class))
            .body(body)
            .send()
            .await
            .map_err(|err| StoreError::Upload {
                bucket: bucket.to_string(),
                key: key.clone(),
                message: DisplayErrorContext(&err).to_string(),
            })?;
        Ok(())
    }

    async fn delete(&self, object: &str, bucket: &str, prefix: &str) -> Result<(), StoreError> {
        let key = object_key(prefix, object);
        debug!("deleting s3://{}/{}", bucket, key);
        self.client
            .delete_object()
            .bucket(bucket)
            .key(&key)
            .send()
            .await
            .map_err(|err| StoreError::Delete {
                bucket: bucket.to_string(),
                key: key.clone(),
                message: DisplayErrorContext(&err).to_string(),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::{Credentials, SharedCredentialsProvider};

    fn credentials() -> SharedCredentialsProvider {
        SharedCredentialsProvider::new(Credentials::new("key", "secret", None, None, "static"))
    }

    #[test]
    fn missing_region_is_a_config_error() {
        let shared = SdkConfig::builder()
            .credentials_provider(credentials())
            .build();
        let err = check_shared_config(&shared).expect_err("no region");
        assert!(matches!(err, StoreError::Config(ref msg) if msg.contains("region")));
    }

    #[test]
    fn missing_credentials_is_a_config_error() {
        let shared = SdkConfig::builder()
            .region(Region::new("eu-west-1"))
            .build();
        let err = check_shared_config(&shared).expect_err("no credentials");
        assert!(matches!(err, StoreError::Config(ref msg) if msg.contains("credentials")));
    }

    #[test]
    fn region_and_credentials_are_enough() {
        let shared = SdkConfig::builder()
            .region(Region::new("eu-west-1"))
            .credentials_provider(credentials())
            .build();
        check_shared_config(&shared).expect("complete config");
    }
}

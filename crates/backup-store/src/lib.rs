mod s3;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

pub use s3::{S3Settings, S3Store};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{} has no file name", .0.display())]
    NoFileName(std::path::PathBuf),

    #[error("object store is not configured: {0}")]
    Config(String),

    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("upload of s3://{bucket}/{key} failed: {message}")]
    Upload {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("delete of s3://{bucket}/{key} failed: {message}")]
    Delete {
        bucket: String,
        key: String,
        message: String,
    },
}

/// Remote bucket holding the archives.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads `local_file` as `<prefix>/<file name>`.
    async fn put(
        &self,
        local_file: &Path,
        bucket: &str,
        prefix: &str,
        storage_class: &str,
    ) -> Result<(), StoreError>;

    /// Deleting an object that is already gone succeeds.
    async fn delete(&self, object: &str, bucket: &str, prefix: &str) -> Result<(), StoreError>;
}

/// `<prefix>/<name>` without doubled or leading slashes.
pub fn object_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let name = name.trim_start_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

use backup_archive::ArchiveError;
use backup_catalog::CatalogError;
use backup_core::{Classify, ErrorClass, io_error_class};
use backup_rcon::RemoteError;
use backup_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("{container} is unreachable: {reason}")]
    InstanceUnreachable { container: String, reason: String },

    #[error("could not quiesce {container}: {source}")]
    QuiesceFailed {
        container: String,
        #[source]
        source: RemoteError,
    },

    #[error("could not archive {container}: {source}")]
    ArchiveFailed {
        container: String,
        #[source]
        source: ArchiveError,
    },

    #[error("archive of {container} still failing after {attempts} attempts")]
    ArchiveStuck { container: String, attempts: u32 },

    #[error("could not upload the save for {container}: {source}")]
    UploadFailed {
        container: String,
        #[source]
        source: StoreError,
    },

    #[error("could not read the catalog for {container}: {source}")]
    CatalogReadFailed {
        container: String,
        #[source]
        source: CatalogError,
    },

    #[error("could not record save {filename} for {container}: {source}")]
    CatalogWriteFailed {
        container: String,
        filename: String,
        #[source]
        source: CatalogError,
    },
}

impl BackupError {
    pub fn unreachable(container: &str, reason: impl Into<String>) -> Self {
        Self::InstanceUnreachable {
            container: container.to_string(),
            reason: reason.into(),
        }
    }
}

impl Classify for BackupError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::ArchiveFailed { source, .. } => source
                .io_source()
                .map(io_error_class)
                .unwrap_or(ErrorClass::PerInstanceFatal),
            _ => ErrorClass::PerInstanceFatal,
        }
    }
}

#[derive(Debug, Error)]
pub enum PruneError {
    #[error("could not delete old save {filename} of {container}: {source}")]
    PruneFailed {
        container: String,
        filename: String,
        #[source]
        source: StoreError,
    },

    #[error("catalog error while pruning {container}: {source}")]
    Catalog {
        container: String,
        #[source]
        source: CatalogError,
    },
}

impl Classify for PruneError {
    fn class(&self) -> ErrorClass {
        ErrorClass::PerInstanceFatal
    }
}

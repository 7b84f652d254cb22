mod error;
mod targz;

use std::path::Path;

use async_trait::async_trait;

pub use error::ArchiveError;
pub use targz::TarGzProducer;

/// Produces a compressed archive of a directory tree.
///
/// Implementations must fail with a transient error, never truncate, when the
/// tree changes while it is being read.
#[async_trait]
pub trait ArchiveProducer: Send + Sync {
    async fn compress(&self, source_dir: &Path, dest_file: &Path) -> Result<(), ArchiveError>;
}

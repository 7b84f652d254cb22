use std::io;
use std::path::Path;
use std::time::Duration;

use backup_archive::{ArchiveError, ArchiveProducer};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::error::BackupError;

/// How archive attempts are repeated when the world changes underneath them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Duration,
    pub max_backoff: Duration,
    /// Attempt count after which the instance is reported as stuck.
    pub stuck_alert_after: u32,
    /// Unset means retry until an attempt succeeds.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(60),
            stuck_alert_after: 10,
            max_attempts: None,
        }
    }
}

/// Produces `dest` from `source`, retrying transient failures per `policy`.
/// Returns the number of attempts it took.
pub async fn produce_archive(
    archiver: &dyn ArchiveProducer,
    source: &Path,
    dest: &Path,
    policy: &RetryPolicy,
    container: &str,
) -> Result<u32, BackupError> {
    let mut attempts = 0u32;
    let mut delay = policy.backoff;

    loop {
        attempts += 1;
        let err = match archiver.compress(source, dest).await {
            Ok(()) => {
                if attempts > 1 {
                    info!(attempts, "archive of {} succeeded after retrying", container);
                }
                return Ok(attempts);
            }
            Err(err) if err.is_transient() => err,
            Err(err) => {
                if let Err(cleanup) = remove_local_archive(dest).await {
                    warn!(
                        "could not remove partial archive {}: {}",
                        dest.display(),
                        cleanup
                    );
                }
                return Err(archive_failed(container, err));
            }
        };

        warn!(attempt = attempts, "archive of {} was disturbed: {}", container, err);
        remove_local_archive(dest)
            .await
            .map_err(|source| archive_failed(container, ArchiveError::io("removing partial archive", source)))?;

        if policy.max_attempts.is_some_and(|max| attempts >= max) {
            return Err(BackupError::ArchiveStuck {
                container: container.to_string(),
                attempts,
            });
        }
        if attempts == policy.stuck_alert_after {
            error!(
                attempts,
                "archive of {} keeps failing; the world may never settle while saving is off",
                container
            );
        }

        debug!("retrying archive of {} in {:?}", container, delay);
        sleep(delay).await;
        delay = (delay * 2).min(policy.max_backoff);
    }
}

/// Removes a local archive; a file that is already gone counts as removed.
pub async fn remove_local_archive(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

fn archive_failed(container: &str, source: ArchiveError) -> BackupError {
    BackupError::ArchiveFailed {
        container: container.to_string(),
        source,
    }
}

use std::sync::Arc;

use backup_archive::{ArchiveError, ArchiveProducer};
use backup_catalog::Catalog;
use backup_core::{Instance, NewSave, Save};
use backup_rcon::{RemoteControl, RemoteTarget};
use backup_store::{ObjectStore, object_key};
use backup_utils::archive_file_name;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::error::BackupError;
use super::prune::Pruner;
use super::quiesce::{Quiesce, QuiesceTiming};
use super::snapshot::{RetryPolicy, produce_archive, remove_local_archive};

const ANNOUNCE_SUCCESS: &str = "Save successful!";
const ANNOUNCE_FAILURE: &str = "Save failed!";

#[derive(Debug, Clone)]
pub struct BackupPolicy {
    /// Live saves kept per instance, including the one about to be taken.
    pub retention: usize,
    pub storage_class: String,
    pub quiesce: QuiesceTiming,
    pub retry: RetryPolicy,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            retention: 5,
            storage_class: "STANDARD".to_string(),
            quiesce: QuiesceTiming::default(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// Nobody is online, so nothing changed since the last save.
    NoPlayers,
    Stored { save: Save, archive_attempts: u32 },
}

/// Drives one instance through quiesce, archive, upload, record and resume.
pub struct Orchestrator {
    remote: Arc<dyn RemoteControl>,
    archiver: Arc<dyn ArchiveProducer>,
    store: Arc<dyn ObjectStore>,
    catalog: Catalog,
    pruner: Pruner,
    policy: BackupPolicy,
}

impl Orchestrator {
    pub fn new(
        remote: Arc<dyn RemoteControl>,
        archiver: Arc<dyn ArchiveProducer>,
        store: Arc<dyn ObjectStore>,
        catalog: Catalog,
        policy: BackupPolicy,
    ) -> Self {
        let pruner = Pruner::new(catalog.clone(), store.clone());
        Self {
            remote,
            archiver,
            store,
            catalog,
            pruner,
            policy,
        }
    }

    pub async fn run_backup(&self, instance: &Instance) -> Result<BackupOutcome, BackupError> {
        let target = RemoteTarget::new(instance.container.as_str(), instance.working_path.as_path());

        let players = self.probe(instance, &target).await?;
        if players == 0 {
            info!("no players on {}, skipping backup", instance.container);
            return Ok(BackupOutcome::NoPlayers);
        }

        let keep = self.policy.retention.saturating_sub(1);
        match self.pruner.prune(instance, keep).await {
            Ok(report) => debug!(
                kept = report.kept,
                deleted = report.deleted.len(),
                "retention applied to {}",
                instance.container
            ),
            Err(err) => warn!("{}; will retry on the next pass", err),
        }

        let keep_inventory = format!("gamerule keepInventory {}", instance.keep_inventory);
        if let Err(err) = self.remote.send(&target, &keep_inventory).await {
            warn!("could not apply keepInventory on {}: {}", instance.container, err);
        }

        let quiesce =
            match Quiesce::begin(self.remote.clone(), target.clone(), &self.policy.quiesce).await {
                Ok(quiesce) => quiesce,
                Err(source) => {
                    self.announce(instance, &target, ANNOUNCE_FAILURE).await;
                    return Err(BackupError::QuiesceFailed {
                        container: instance.container.clone(),
                        source,
                    });
                }
            };
        let result = self.capture(instance).await;
        quiesce.release().await;

        let announcement = if result.is_ok() {
            ANNOUNCE_SUCCESS
        } else {
            ANNOUNCE_FAILURE
        };
        self.announce(instance, &target, announcement).await;

        let (save, archive_attempts) = result?;
        Ok(BackupOutcome::Stored {
            save,
            archive_attempts,
        })
    }

    async fn announce(&self, instance: &Instance, target: &RemoteTarget, message: &str) {
        if let Err(err) = self.remote.say(target, message).await {
            warn!("could not notify players on {}: {}", instance.container, err);
        }
    }

    async fn probe(&self, instance: &Instance, target: &RemoteTarget) -> Result<u32, BackupError> {
        match self.remote.is_running(target).await {
            Ok(true) => {}
            Ok(false) => return Err(BackupError::unreachable(&instance.container, "not running")),
            Err(err) => return Err(BackupError::unreachable(&instance.container, err.to_string())),
        }
        self.remote
            .player_count(target)
            .await
            .map_err(|err| BackupError::unreachable(&instance.container, err.to_string()))
    }

    /// Archive, upload and record. The local archive is removed whatever happens.
    async fn capture(&self, instance: &Instance) -> Result<(Save, u32), BackupError> {
        let filename = self.unused_archive_name(instance).await?;
        let local = instance.local_archive_path(&filename);

        let result = self.archive_and_store(instance, &filename, &local).await;
        if let Err(err) = remove_local_archive(&local).await {
            warn!("could not remove local archive {}: {}", local.display(), err);
        }
        result
    }

    /// Timestamped archive name no other save of the instance has used, so an
    /// upload never replaces an object a catalog row points at.
    async fn unused_archive_name(&self, instance: &Instance) -> Result<String, BackupError> {
        let stem = instance.archive_stem();
        let now = Utc::now();
        let mut seq = 0;
        loop {
            let candidate = archive_file_name(&stem, now, seq);
            let taken = self
                .catalog
                .has_save(instance.id, &candidate)
                .await
                .map_err(|source| BackupError::CatalogReadFailed {
                    container: instance.container.clone(),
                    source,
                })?;
            if !taken && !instance.local_archive_path(&candidate).exists() {
                return Ok(candidate);
            }
            seq += 1;
        }
    }

    async fn archive_and_store(
        &self,
        instance: &Instance,
        filename: &str,
        local: &std::path::Path,
    ) -> Result<(Save, u32), BackupError> {
        let container = instance.container.as_str();
        let attempts = produce_archive(
            self.archiver.as_ref(),
            &instance.world_dir(),
            local,
            &self.policy.retry,
            container,
        )
        .await?;

        let size = tokio::fs::metadata(local)
            .await
            .map_err(|err| BackupError::ArchiveFailed {
                container: container.to_string(),
                source: ArchiveError::io("reading archive size", err),
            })?
            .len();

        self.store
            .put(local, &instance.bucket, &instance.prefix, &self.policy.storage_class)
            .await
            .map_err(|source| BackupError::UploadFailed {
                container: container.to_string(),
                source,
            })?;

        let save = self
            .catalog
            .record_save(NewSave {
                instance_id: instance.id,
                filename: filename.to_string(),
                size,
            })
            .await
            .map_err(|source| {
                error!(
                    "catalog is missing {}/{} for {}; the object exists remotely",
                    instance.bucket,
                    object_key(&instance.prefix, filename),
                    container
                );
                BackupError::CatalogWriteFailed {
                    container: container.to_string(),
                    filename: filename.to_string(),
                    source,
                }
            })?;
        Ok((save, attempts))
    }
}

use std::sync::Arc;

use backup_catalog::Catalog;
use backup_core::Instance;
use backup_store::ObjectStore;
use tracing::{debug, info};

use super::error::PruneError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneReport {
    pub kept: usize,
    /// Filenames removed in this pass, oldest first.
    pub deleted: Vec<String>,
}

/// Keeps the newest saves of an instance and removes the rest, remotely and
/// in the catalog.
#[derive(Clone)]
pub struct Pruner {
    catalog: Catalog,
    store: Arc<dyn ObjectStore>,
}

impl Pruner {
    pub fn new(catalog: Catalog, store: Arc<dyn ObjectStore>) -> Self {
        Self { catalog, store }
    }

    pub async fn prune(&self, instance: &Instance, keep: usize) -> Result<PruneReport, PruneError> {
        let catalog_err = |source| PruneError::Catalog {
            container: instance.container.clone(),
            source,
        };

        let live = self
            .catalog
            .live_saves(instance.id)
            .await
            .map_err(catalog_err)?;
        if live.len() <= keep {
            debug!("{} has {} live saves, nothing to prune", instance.container, live.len());
            return Ok(PruneReport {
                kept: live.len(),
                deleted: Vec::new(),
            });
        }

        let (retained, candidates) = live.split_at(keep);
        let mut batch = self.catalog.begin_tombstones().await.map_err(catalog_err)?;
        let mut deleted = Vec::with_capacity(candidates.len());

        // Oldest first, so an aborted pass still removed the least valuable saves.
        for save in candidates.iter().rev() {
            self.store
                .delete(&save.filename, &instance.bucket, &instance.prefix)
                .await
                .map_err(|source| PruneError::PruneFailed {
                    container: instance.container.clone(),
                    filename: save.filename.clone(),
                    source,
                })?;
            batch.mark(save.id).await.map_err(catalog_err)?;
            deleted.push(save.filename.clone());
        }

        let tombstoned = batch.commit().await.map_err(catalog_err)?;
        info!(
            "pruned {} old saves of {}, {} kept",
            tombstoned.len(),
            instance.container,
            retained.len()
        );
        Ok(PruneReport {
            kept: retained.len(),
            deleted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::backup::testing::{FakeStore, register, seed_saves};

    async fn setup(count: usize) -> (Catalog, Arc<FakeStore>, Instance, Vec<backup_core::Save>) {
        let catalog = Catalog::open_in_memory().await.expect("catalog");
        let store = FakeStore::new();
        // Pruning never touches the working directory.
        let instance = register(&catalog, "survival", Path::new("/srv/survival")).await;
        let saves = seed_saves(&catalog, &store, &instance, count).await;
        (catalog, store, instance, saves)
    }

    #[tokio::test]
    async fn keeps_the_newest_and_deletes_oldest_first() {
        let (catalog, store, instance, saves) = setup(6).await;
        let pruner = Pruner::new(catalog.clone(), store.clone());

        let report = pruner.prune(&instance, 4).await.expect("prune");

        assert_eq!(report.kept, 4);
        assert_eq!(report.deleted, vec![saves[0].filename.clone(), saves[1].filename.clone()]);
        let live = catalog.live_saves(instance.id).await.expect("live");
        assert_eq!(live.len(), 4);
        assert_eq!(live[0].id, saves[5].id);
        assert_eq!(store.len(), 4);
        assert!(
            store
                .size_of(&instance.bucket, &instance.prefix, &saves[0].filename)
                .is_none()
        );
        let all = catalog.saves(instance.id).await.expect("all");
        assert_eq!(all.iter().filter(|s| s.deleted).count(), 2);
    }

    #[tokio::test]
    async fn second_pass_deletes_nothing() {
        let (catalog, store, instance, _) = setup(6).await;
        let pruner = Pruner::new(catalog.clone(), store.clone());

        pruner.prune(&instance, 4).await.expect("first prune");
        let before = catalog.live_saves(instance.id).await.expect("live");
        let report = pruner.prune(&instance, 4).await.expect("second prune");

        assert!(report.deleted.is_empty());
        assert_eq!(catalog.live_saves(instance.id).await.expect("live"), before);
    }

    #[tokio::test]
    async fn delete_failure_rolls_back_the_whole_pass() {
        let (catalog, store, instance, saves) = setup(6).await;
        let pruner = Pruner::new(catalog.clone(), store.clone());
        store.fail_delete_of(Some(&saves[1].filename));

        let err = pruner.prune(&instance, 4).await.expect_err("should fail");
        assert!(matches!(err, PruneError::PruneFailed { ref filename, .. } if *filename == saves[1].filename));
        // The oldest object is already gone remotely, but its row stays live.
        assert_eq!(catalog.live_saves(instance.id).await.expect("live").len(), 6);

        store.fail_delete_of(None);
        let report = pruner.prune(&instance, 4).await.expect("retry");
        assert_eq!(report.deleted.len(), 2);
        assert_eq!(catalog.live_saves(instance.id).await.expect("live").len(), 4);
    }

    #[tokio::test]
    async fn keep_at_or_above_live_count_is_a_no_op() {
        let (catalog, store, instance, _) = setup(3).await;
        let pruner = Pruner::new(catalog.clone(), store.clone());

        let report = pruner.prune(&instance, 3).await.expect("prune");
        assert_eq!(report.kept, 3);
        assert!(report.deleted.is_empty());
        assert_eq!(store.len(), 3);
    }
}

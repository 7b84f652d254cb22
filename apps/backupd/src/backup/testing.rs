//! In-process stand-ins for the remote control, archive producer and object
//! store, with failure injection.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use backup_archive::{ArchiveError, ArchiveProducer};
use backup_catalog::Catalog;
use backup_core::{Instance, NewInstance, NewSave, Save};
use backup_rcon::{RemoteControl, RemoteError, RemoteTarget};
use backup_store::{ObjectStore, StoreError, object_key};

use super::orchestrator::BackupPolicy;
use super::quiesce::QuiesceTiming;
use super::snapshot::RetryPolicy;

pub fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("backupd-{prefix}-{nanos}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub fn instant_policy(retention: usize) -> BackupPolicy {
    BackupPolicy {
        retention,
        storage_class: "STANDARD".to_string(),
        quiesce: QuiesceTiming {
            flush_settle: Duration::ZERO,
            save_off_settle: Duration::ZERO,
        },
        retry: RetryPolicy {
            backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            stuck_alert_after: 3,
            max_attempts: None,
        },
    }
}

pub async fn register(catalog: &Catalog, container: &str, working_path: &Path) -> Instance {
    catalog
        .add_instance(NewInstance {
            container: container.to_string(),
            description: None,
            dir_name: "world".to_string(),
            keep_inventory: false,
            bucket: "mc-backups".to_string(),
            prefix: container.to_string(),
            working_path: working_path.to_path_buf(),
        })
        .await
        .expect("register instance")
}

/// Records `count` saves both in the catalog and the store, oldest first.
pub async fn seed_saves(
    catalog: &Catalog,
    store: &FakeStore,
    instance: &Instance,
    count: usize,
) -> Vec<Save> {
    let mut saves = Vec::new();
    for n in 0..count {
        let filename = format!("world-seed-{n:02}.tar.gz");
        store.seed(&instance.bucket, &instance.prefix, &filename, 10);
        let save = catalog
            .record_save(NewSave {
                instance_id: instance.id,
                filename,
                size: 10,
            })
            .await
            .expect("seed save");
        saves.push(save);
    }
    saves
}

pub fn leftover_archives(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .expect("read working dir")
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.to_string_lossy().ends_with(".tar.gz"))
        .collect()
}

#[derive(Default)]
struct ServerState {
    offline: bool,
    players: Option<u32>,
    fail: HashSet<String>,
    log: Vec<String>,
}

/// Every container starts online with one player.
#[derive(Default)]
pub struct FakeRemote {
    servers: Mutex<HashMap<String, ServerState>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with<R>(&self, container: &str, f: impl FnOnce(&mut ServerState) -> R) -> R {
        let mut servers = self.servers.lock().expect("fake remote lock");
        f(servers.entry(container.to_string()).or_default())
    }

    pub fn set_players(&self, container: &str, players: u32) {
        self.with(container, |s| s.players = Some(players));
    }

    pub fn set_offline(&self, container: &str) {
        self.with(container, |s| s.offline = true);
    }

    pub fn fail_on(&self, container: &str, command: &str) {
        self.with(container, |s| {
            s.fail.insert(command.to_string());
        });
    }

    pub fn commands(&self, container: &str) -> Vec<String> {
        self.with(container, |s| s.log.clone())
    }

    /// Whether the last persistence toggle left saving on.
    pub fn persistence_enabled(&self, container: &str) -> bool {
        self.with(container, |s| {
            s.log
                .iter()
                .rev()
                .find(|c| *c == "save-off" || *c == "save-on")
                .is_none_or(|c| c == "save-on")
        })
    }
}

#[async_trait]
impl RemoteControl for FakeRemote {
    async fn send(&self, target: &RemoteTarget, command: &str) -> Result<String, RemoteError> {
        self.with(&target.container, |s| {
            s.log.push(command.to_string());
            if s.offline || s.fail.contains(command) {
                return Err(RemoteError::CommandFailed {
                    command: command.to_string(),
                    output: "injected failure".to_string(),
                });
            }
            if command == "list" {
                let players = s.players.unwrap_or(1);
                return Ok(format!("There are {players} of a max of 20 players online:"));
            }
            Ok(String::new())
        })
    }

    async fn is_running(&self, target: &RemoteTarget) -> Result<bool, RemoteError> {
        Ok(self.with(&target.container, |s| !s.offline))
    }
}

/// Writes a fixed payload. Can fail transiently a number of times or fail
/// with a fixed I/O error kind; failed attempts leave a partial file behind.
pub struct FakeArchiver {
    payload: Vec<u8>,
    transient_failures: AtomicU32,
    fatal: Mutex<Option<io::ErrorKind>>,
    calls: AtomicU32,
}

impl FakeArchiver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            payload: vec![42u8; 1234],
            transient_failures: AtomicU32::new(0),
            fatal: Mutex::new(None),
            calls: AtomicU32::new(0),
        })
    }

    pub fn fail_transiently(&self, times: u32) {
        self.transient_failures.store(times, Ordering::SeqCst);
    }

    pub fn fail_fatally(&self, kind: io::ErrorKind) {
        *self.fatal.lock().expect("archiver lock") = Some(kind);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn payload_len(&self) -> u64 {
        self.payload.len() as u64
    }
}

#[async_trait]
impl ArchiveProducer for FakeArchiver {
    async fn compress(&self, source_dir: &Path, dest_file: &Path) -> Result<(), ArchiveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::fs::write(dest_file, b"partial").map_err(|err| ArchiveError::io("writing", err))?;

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ArchiveError::SourceChanged {
                path: source_dir.join("level.dat"),
            });
        }
        if let Some(kind) = *self.fatal.lock().expect("archiver lock") {
            return Err(ArchiveError::io("archiving file", io::Error::from(kind)));
        }

        std::fs::write(dest_file, &self.payload).map_err(|err| ArchiveError::io("writing", err))
    }
}

/// Objects keyed by `bucket/key`, valued by size.
#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<BTreeMap<String, u64>>,
    fail_put: Mutex<bool>,
    fail_delete: Mutex<Option<String>>,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn full_key(bucket: &str, prefix: &str, name: &str) -> String {
        format!("{bucket}/{}", object_key(prefix, name))
    }

    pub fn seed(&self, bucket: &str, prefix: &str, name: &str, size: u64) {
        self.objects
            .lock()
            .expect("store lock")
            .insert(Self::full_key(bucket, prefix, name), size);
    }

    pub fn size_of(&self, bucket: &str, prefix: &str, name: &str) -> Option<u64> {
        self.objects
            .lock()
            .expect("store lock")
            .get(&Self::full_key(bucket, prefix, name))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().expect("store lock").len()
    }

    pub fn fail_puts(&self, fail: bool) {
        *self.fail_put.lock().expect("store lock") = fail;
    }

    pub fn fail_delete_of(&self, name: Option<&str>) {
        *self.fail_delete.lock().expect("store lock") = name.map(str::to_string);
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn put(
        &self,
        local_file: &Path,
        bucket: &str,
        prefix: &str,
        _storage_class: &str,
    ) -> Result<(), StoreError> {
        let name = local_file
            .file_name()
            .ok_or_else(|| StoreError::NoFileName(local_file.to_path_buf()))?
            .to_string_lossy()
            .into_owned();
        if *self.fail_put.lock().expect("store lock") {
            return Err(StoreError::Upload {
                bucket: bucket.to_string(),
                key: object_key(prefix, &name),
                message: "injected failure".to_string(),
            });
        }
        let size = std::fs::metadata(local_file)
            .map_err(|err| StoreError::Read {
                path: local_file.display().to_string(),
                message: err.to_string(),
            })?
            .len();
        self.seed(bucket, prefix, &name, size);
        Ok(())
    }

    async fn delete(&self, object: &str, bucket: &str, prefix: &str) -> Result<(), StoreError> {
        if self.fail_delete.lock().expect("store lock").as_deref() == Some(object) {
            return Err(StoreError::Delete {
                bucket: bucket.to_string(),
                key: object_key(prefix, object),
                message: "injected failure".to_string(),
            });
        }
        self.objects
            .lock()
            .expect("store lock")
            .remove(&Self::full_key(bucket, prefix, object));
        Ok(())
    }
}

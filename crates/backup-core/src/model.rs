use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub type InstanceId = i64;
pub type SaveId = i64;
pub type UnixMillis = i64;

/// A managed game server. Read-only to the backup engine at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    /// Key used by the remote control client (docker container name).
    pub container: String,
    pub description: Option<String>,
    /// World directory, relative to `working_path`.
    pub dir_name: String,
    pub keep_inventory: bool,
    pub bucket: String,
    pub prefix: String,
    pub working_path: PathBuf,
    pub active: bool,
    pub created_at_ms: UnixMillis,
}

impl Instance {
    pub fn world_dir(&self) -> PathBuf {
        self.working_path.join(&self.dir_name)
    }

    /// Last component of `dir_name`, used to name archives.
    pub fn archive_stem(&self) -> String {
        Path::new(&self.dir_name)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "world".to_string())
    }

    pub fn local_archive_path(&self, filename: &str) -> PathBuf {
        self.working_path.join(filename)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInstance {
    pub container: String,
    pub description: Option<String>,
    pub dir_name: String,
    pub keep_inventory: bool,
    pub bucket: String,
    pub prefix: String,
    pub working_path: PathBuf,
}

/// One catalogued archive. `deleted` is a tombstone: the row stays, the
/// remote object is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Save {
    pub id: SaveId,
    pub instance_id: InstanceId,
    pub filename: String,
    pub size: u64,
    pub deleted: bool,
    pub created_at_ms: UnixMillis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSave {
    pub instance_id: InstanceId,
    pub filename: String,
    pub size: u64,
}

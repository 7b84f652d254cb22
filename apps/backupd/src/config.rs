use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use backup_core::CoreError;
use backup_store::S3Settings;
use serde::{Deserialize, Serialize};

use crate::backup::{BackupPolicy, QuiesceTiming, RetryPolicy};

/// `backupd.toml`. Every key is optional.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub interval_minutes: u64,
    pub retention: usize,
    pub database: PathBuf,
    pub log_file: Option<PathBuf>,
    pub storage_class: String,
    pub quiesce: QuiesceConfig,
    pub archive: ArchiveConfig,
    pub remote: RemoteConfig,
    pub s3: S3Config,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 30,
            retention: 5,
            database: PathBuf::from("./db.sqlite"),
            log_file: Some(PathBuf::from("./log.log")),
            storage_class: "STANDARD".to_string(),
            quiesce: QuiesceConfig::default(),
            archive: ArchiveConfig::default(),
            remote: RemoteConfig::default(),
            s3: S3Config::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuiesceConfig {
    pub flush_settle_secs: u64,
    pub save_off_settle_secs: u64,
}

impl Default for QuiesceConfig {
    fn default() -> Self {
        Self {
            flush_settle_secs: 10,
            save_off_settle_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    pub backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub stuck_alert_after: u32,
    pub max_attempts: Option<u32>,
    /// gzip level, 0 (store) to 9 (smallest).
    pub compression_level: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            backoff_secs: 5,
            max_backoff_secs: 60,
            stuck_alert_after: 10,
            max_attempts: None,
            compression_level: 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteMode {
    /// `docker exec <container> rcon-cli ...`
    Docker,
    /// RCON straight to the address in `server.properties`.
    Rcon,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
    pub mode: RemoteMode,
    pub docker_bin: PathBuf,
    pub rcon_cli: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            mode: RemoteMode::Docker,
            docker_bin: PathBuf::from("/usr/bin/docker"),
            rcon_cli: "rcon-cli".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct S3Config {
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub force_path_style: bool,
}

impl DaemonConfig {
    /// Reads and validates `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let config = match fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents)?,
            Err(err) if err.kind() == ErrorKind::NotFound => Self::default(),
            Err(source) => return Err(CoreError::io("reading config file", source)),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self, CoreError> {
        toml::from_str(contents).map_err(|err| CoreError::InvalidConfig(err.to_string()))
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.retention < 1 {
            return Err(CoreError::InvalidConfig(
                "retention must keep at least one save".to_string(),
            ));
        }
        if self.interval_minutes < 1 {
            return Err(CoreError::InvalidConfig(
                "interval_minutes must be at least 1".to_string(),
            ));
        }
        if self.archive.stuck_alert_after < 1 {
            return Err(CoreError::InvalidConfig(
                "archive.stuck_alert_after must be at least 1".to_string(),
            ));
        }
        if self.archive.max_attempts == Some(0) {
            return Err(CoreError::InvalidConfig(
                "archive.max_attempts must be at least 1 when set".to_string(),
            ));
        }
        if self.archive.compression_level > 9 {
            return Err(CoreError::InvalidConfig(
                "archive.compression_level must be between 0 and 9".to_string(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }

    pub fn backup_policy(&self) -> BackupPolicy {
        BackupPolicy {
            retention: self.retention,
            storage_class: self.storage_class.clone(),
            quiesce: QuiesceTiming {
                flush_settle: Duration::from_secs(self.quiesce.flush_settle_secs),
                save_off_settle: Duration::from_secs(self.quiesce.save_off_settle_secs),
            },
            retry: RetryPolicy {
                backoff: Duration::from_secs(self.archive.backoff_secs),
                max_backoff: Duration::from_secs(self.archive.max_backoff_secs),
                stuck_alert_after: self.archive.stuck_alert_after,
                max_attempts: self.archive.max_attempts,
            },
        }
    }

    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            region: self.s3.region.clone(),
            endpoint: self.s3.endpoint.clone(),
            force_path_style: self.s3.force_path_style,
        }
    }
}

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Timestamp layout used in archive names, UTC down to the millisecond. Only
/// digits, `-` and `_`, so it is safe on every filesystem and in object-store keys.
const FILE_SAFE_FORMAT: &str = "%Y-%m-%d_%H-%M-%S-%3f";

pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub fn file_safe_timestamp(at: DateTime<Utc>) -> String {
    at.format(FILE_SAFE_FORMAT).to_string()
}

/// `<dir_name>-<timestamp>.tar.gz`, or `<dir_name>-<timestamp>-<seq>.tar.gz`
/// when `seq` is non-zero.
pub fn archive_file_name(dir_name: &str, at: DateTime<Utc>, seq: u32) -> String {
    let stamp = file_safe_timestamp(at);
    if seq == 0 {
        format!("{dir_name}-{stamp}.tar.gz")
    } else {
        format!("{dir_name}-{stamp}-{seq}.tar.gz")
    }
}

/// Lock file guarding a catalog database, kept next to it.
pub fn lock_path_for(database: &Path) -> PathBuf {
    let mut name = database
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "backupd".into());
    name.push(".lock");
    database.with_file_name(name)
}

pub fn ensure_dir(p: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(p)
}

pub fn ensure_parent_dir(p: &Path) -> std::io::Result<()> {
    match p.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn archive_names_are_filesystem_safe() {
        let at = Utc
            .with_ymd_and_hms(2024, 3, 9, 7, 5, 2)
            .single()
            .expect("valid time")
            + chrono::Duration::milliseconds(42);
        let name = archive_file_name("world", at, 0);
        assert_eq!(name, "world-2024-03-09_07-05-02-042.tar.gz");
        assert!(!name.contains(':'));
        assert!(!name.contains(' '));
    }

    #[test]
    fn sequence_number_disambiguates_same_instant() {
        let at = Utc
            .with_ymd_and_hms(2024, 11, 3, 1, 30, 0)
            .single()
            .expect("valid time");
        let first = archive_file_name("world", at, 0);
        let second = archive_file_name("world", at, 1);
        assert_ne!(first, second);
        assert_eq!(second, "world-2024-11-03_01-30-00-000-1.tar.gz");
    }

    #[test]
    fn lock_path_sits_next_to_database() {
        assert_eq!(
            lock_path_for(Path::new("/var/lib/backupd/db.sqlite")),
            PathBuf::from("/var/lib/backupd/db.sqlite.lock")
        );
        assert_eq!(lock_path_for(Path::new("db.sqlite")), PathBuf::from("db.sqlite.lock"));
    }
}

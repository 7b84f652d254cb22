use std::fs::{self, File, Metadata};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use walkdir::WalkDir;

use crate::{ArchiveError, ArchiveProducer};

/// `.tar.gz` producer. Every regular file is streamed with its length pinned
/// to the size observed before reading, then re-stat'ed; any difference is
/// reported as [`ArchiveError::SourceChanged`].
#[derive(Debug, Clone)]
pub struct TarGzProducer {
    level: Compression,
}

impl TarGzProducer {
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level),
        }
    }
}

impl Default for TarGzProducer {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

#[async_trait]
impl ArchiveProducer for TarGzProducer {
    async fn compress(&self, source_dir: &Path, dest_file: &Path) -> Result<(), ArchiveError> {
        let source = source_dir.to_path_buf();
        let dest = dest_file.to_path_buf();
        let level = self.level;
        tokio::task::spawn_blocking(move || write_archive(&source, &dest, level))
            .await
            .map_err(|err| ArchiveError::Task(err.to_string()))?
    }
}

fn write_archive(source: &Path, dest: &Path, level: Compression) -> Result<(), ArchiveError> {
    if !source.is_dir() {
        return Err(ArchiveError::SourceMissing(source.to_path_buf()));
    }
    let root_name = source
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let file = File::create(dest).map_err(|err| ArchiveError::io("creating archive file", err))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, level));
    builder.follow_symlinks(false);

    for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|err| walk_error(source, err))?;
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let name = if relative.as_os_str().is_empty() {
            root_name.clone()
        } else {
            root_name.join(relative)
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            builder
                .append_dir(&name, entry.path())
                .map_err(|err| source_error(entry.path(), "adding directory", err))?;
        } else if file_type.is_file() {
            append_file_checked(&mut builder, entry.path(), &name)?;
        } else if file_type.is_symlink() {
            builder
                .append_path_with_name(entry.path(), &name)
                .map_err(|err| source_error(entry.path(), "adding symlink", err))?;
        }
    }

    let encoder = builder
        .into_inner()
        .map_err(|err| ArchiveError::io("finishing tar stream", err))?;
    let file = encoder
        .finish()
        .map_err(|err| ArchiveError::io("finishing gzip stream", err))?;
    file.sync_all()
        .map_err(|err| ArchiveError::io("syncing archive file", err))?;
    Ok(())
}

fn append_file_checked<W: Write>(
    builder: &mut tar::Builder<W>,
    path: &Path,
    name: &Path,
) -> Result<(), ArchiveError> {
    let before = fs::metadata(path).map_err(|err| source_error(path, "reading metadata", err))?;
    let file = File::open(path).map_err(|err| source_error(path, "opening file", err))?;

    let mut header = tar::Header::new_gnu();
    header.set_metadata(&before);
    let mut reader = ExactReader::new(file, before.len());
    builder
        .append_data(&mut header, name, &mut reader)
        .map_err(|err| source_error(path, "archiving file", err))?;

    let after = fs::metadata(path).map_err(|err| source_error(path, "reading metadata", err))?;
    if metadata_changed(&before, &after) {
        return Err(ArchiveError::SourceChanged {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn metadata_changed(before: &Metadata, after: &Metadata) -> bool {
    before.len() != after.len() || before.modified().ok() != after.modified().ok()
}

/// Vanished files and short reads mean a writer got in the way.
fn source_error(path: &Path, context: &'static str, err: io::Error) -> ArchiveError {
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::UnexpectedEof => ArchiveError::SourceChanged {
            path: path.to_path_buf(),
        },
        _ => ArchiveError::io(context, err),
    }
}

fn walk_error(source: &Path, err: walkdir::Error) -> ArchiveError {
    let path = err.path().unwrap_or(source).to_path_buf();
    match err.into_io_error() {
        Some(io_err) => source_error(&path, "walking source tree", io_err),
        None => ArchiveError::io(
            "walking source tree",
            io::Error::other(format!("filesystem loop at {}", path.display())),
        ),
    }
}

/// Yields exactly `remaining` bytes, failing with `UnexpectedEof` if the
/// underlying file ends early.
struct ExactReader<R> {
    inner: R,
    remaining: u64,
}

impl<R> ExactReader<R> {
    fn new(inner: R, len: u64) -> Self {
        Self {
            inner,
            remaining: len,
        }
    }
}

impl<R: Read> Read for ExactReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let max = self.remaining.min(buf.len() as u64) as usize;
        if max == 0 {
            return Ok(0);
        }
        let read = self.inner.read(&mut buf[..max])?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file shrank while being read",
            ));
        }
        self.remaining -= read as u64;
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!("backup-archive-{prefix}-{nanos}"))
    }

    #[tokio::test]
    async fn archives_world_under_its_directory_name() {
        let dir = unique_temp_dir("archive");
        let world = dir.join("world");
        std::fs::create_dir_all(world.join("region")).expect("create world dir");
        std::fs::write(world.join("level.dat"), b"level-data").expect("write level.dat");
        std::fs::write(world.join("region").join("r.0.0.mca"), vec![7u8; 4096])
            .expect("write region file");
        let dest = dir.join("world-test.tar.gz");

        TarGzProducer::default()
            .compress(&world, &dest)
            .await
            .expect("archive world");

        let file = File::open(&dest).expect("open archive");
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        let mut level = None;
        let mut names = Vec::new();
        for entry in archive.entries().expect("entries") {
            let mut entry = entry.expect("entry");
            let path = entry.path().expect("path").into_owned();
            if path == Path::new("world/level.dat") {
                let mut body = String::new();
                entry.read_to_string(&mut body).expect("read level.dat");
                level = Some(body);
            }
            names.push(path);
        }

        assert_eq!(level.as_deref(), Some("level-data"));
        assert!(names.contains(&PathBuf::from("world/region/r.0.0.mca")));
        assert!(names.iter().all(|name| name.starts_with("world")));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn missing_source_is_not_transient() {
        let dir = unique_temp_dir("missing");
        std::fs::create_dir_all(&dir).expect("create dir");

        let err = TarGzProducer::default()
            .compress(&dir.join("nope"), &dir.join("out.tar.gz"))
            .await
            .expect_err("missing source");
        assert!(matches!(err, ArchiveError::SourceMissing(_)));
        assert!(!err.is_transient());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn short_read_is_reported_as_source_change() {
        let mut reader = ExactReader::new(&b"abc"[..], 8);
        let mut sink = Vec::new();
        let err = io::copy(&mut reader, &mut sink).expect_err("file shorter than header");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let classified = source_error(Path::new("world/level.dat"), "archiving file", err);
        assert!(classified.is_transient());
    }

    #[test]
    fn reader_stops_at_pinned_length() {
        let mut reader = ExactReader::new(&b"abcdef"[..], 4);
        let mut sink = Vec::new();
        io::copy(&mut reader, &mut sink).expect("copy pinned length");
        assert_eq!(sink, b"abcd");
    }

    #[test]
    fn permission_errors_are_fatal() {
        let err = source_error(
            Path::new("world"),
            "opening file",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(!err.is_transient());
    }
}

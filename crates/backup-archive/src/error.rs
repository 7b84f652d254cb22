use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{} changed while it was being archived", path.display())]
    SourceChanged { path: PathBuf },

    #[error("source directory {} does not exist", .0.display())]
    SourceMissing(PathBuf),

    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("archive task failed: {0}")]
    Task(String),
}

impl ArchiveError {
    pub fn io(context: &'static str, source: io::Error) -> Self {
        Self::Io { context, source }
    }

    /// A retry of the same archive can succeed once the writer settles.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SourceChanged { .. })
    }

    pub fn io_source(&self) -> Option<&io::Error> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

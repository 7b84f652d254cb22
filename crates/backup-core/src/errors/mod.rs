use std::path::PathBuf;

use thiserror::Error;

/// How far an error is allowed to travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retried in place (archive raced a late write).
    Transient,
    /// Ends this instance's pass; the next pass starts from scratch.
    PerInstanceFatal,
    /// Nothing can safely proceed; the process stops.
    ProcessFatal,
}

pub trait Classify {
    fn class(&self) -> ErrorClass;

    fn is_process_fatal(&self) -> bool {
        self.class() == ErrorClass::ProcessFatal
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("missing dependency: {0}")]
    MissingDependency(String),

    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("path error: {0}")]
    Path(String),
}

impl CoreError {
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub fn path(p: impl Into<PathBuf>) -> Self {
        Self::Path(format!("invalid path: {}", p.into().display()))
    }
}

/// Local filesystem failures that no retry or other instance can get past.
pub fn io_error_class(err: &std::io::Error) -> ErrorClass {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::StorageFull | ErrorKind::ReadOnlyFilesystem => ErrorClass::ProcessFatal,
        _ => ErrorClass::PerInstanceFatal,
    }
}

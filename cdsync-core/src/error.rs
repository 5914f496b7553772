use thiserror::Error;

/// Every failure mode a [`crate::driver::SyncDriver`] (or one of its
/// collaborators) can report. One variant per error kind in the design.
#[derive(Error, Debug)]
pub enum CdsyncError {
    #[error("bad argument: {0}")]
    BadArgument(String),

    #[error("busy: {0}")]
    Busy(&'static str),

    #[error("not supported in this direction: {0}")]
    NotSupportedInDirection(&'static str),

    #[error("no such backend configured: {0}")]
    NoSuchBackend(&'static str),

    #[error("broken pipeline: step called after EOF")]
    BrokenPipeline,

    #[error("bad message: {0}")]
    BadMessage(String),

    #[error("object not found")]
    NotFound,

    #[error("store is read-only")]
    ReadOnly,

    #[error("already exists: {0}")]
    Exists(String),

    #[error("no space left on device")]
    NoSpace,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("out of memory")]
    OutOfMemory,

    #[error("no device available")]
    NoDeviceAvailable,
}

pub type Result<T> = std::result::Result<T, CdsyncError>;

impl From<&'static str> for CdsyncError {
    fn from(s: &'static str) -> Self {
        CdsyncError::BadArgument(s.to_string())
    }
}

/// Classify an I/O failure the way the original mapped `errno` inline,
/// instead of always falling through to the generic `Io` variant.
pub fn classify_io(err: std::io::Error) -> CdsyncError {
    use std::io::ErrorKind::*;
    match err.kind() {
        AlreadyExists => CdsyncError::Exists(err.to_string()),
        NotFound => CdsyncError::NotFound,
        OutOfMemory => CdsyncError::OutOfMemory,
        StorageFull => CdsyncError::NoSpace,
        _ => CdsyncError::Io(err),
    }
}

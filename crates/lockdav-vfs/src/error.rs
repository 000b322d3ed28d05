//! Error classification for storage backends.
//!
//! Backends report failures through [`VfsError`], a small closed set of
//! categories the WebDAV layer knows how to turn into HTTP statuses. Plain
//! `io::Error`s are classified by kind (and, for space exhaustion, by raw
//! errno) so `?` works directly on `std::fs`/`tokio::fs` calls.

use std::io;
use thiserror::Error;

/// Errors reported by a [`Vfs`](crate::Vfs) backend.
#[derive(Debug, Error)]
pub enum VfsError {
    /// No resource at this path.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A resource already exists at this path.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The parent collection of this path does not exist.
    #[error("Parent collection missing: {0}")]
    ParentMissing(String),

    /// A collection was required.
    #[error("Not a collection: {0}")]
    NotACollection(String),

    /// A non-collection resource was required.
    #[error("Is a collection: {0}")]
    IsACollection(String),

    /// The backend refused the operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The backend ran out of space.
    #[error("Insufficient storage")]
    InsufficientStorage,

    /// The backend does not implement this operation.
    #[error("Operation not supported")]
    NotSupported,

    /// Any other I/O failure.
    #[error("IO error: {0}")]
    Io(io::Error),
}

/// Result type for backend operations.
pub type VfsResult<T> = Result<T, VfsError>;

/// `ENOSPC` on every Unix the server targets.
const ENOSPC: i32 = 28;

impl VfsError {
    /// Classify an I/O error that occurred while operating on `path`.
    pub fn from_io(e: io::Error, path: &str) -> Self {
        if e.raw_os_error() == Some(ENOSPC) {
            return VfsError::InsufficientStorage;
        }
        match e.kind() {
            io::ErrorKind::NotFound => VfsError::NotFound(path.to_string()),
            io::ErrorKind::AlreadyExists => VfsError::AlreadyExists(path.to_string()),
            io::ErrorKind::PermissionDenied => VfsError::PermissionDenied(path.to_string()),
            io::ErrorKind::NotADirectory => VfsError::NotACollection(path.to_string()),
            io::ErrorKind::IsADirectory => VfsError::IsACollection(path.to_string()),
            io::ErrorKind::StorageFull => VfsError::InsufficientStorage,
            _ => VfsError::Io(e),
        }
    }

    /// True for the not-found category.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NotFound(_))
    }
}

impl From<io::Error> for VfsError {
    fn from(e: io::Error) -> Self {
        VfsError::from_io(e, "")
    }
}

impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::Io(e) => e,
            VfsError::NotFound(_) => io::Error::new(io::ErrorKind::NotFound, e.to_string()),
            VfsError::AlreadyExists(_) => {
                io::Error::new(io::ErrorKind::AlreadyExists, e.to_string())
            }
            VfsError::PermissionDenied(_) => {
                io::Error::new(io::ErrorKind::PermissionDenied, e.to_string())
            }
            other => io::Error::other(other.to_string()),
        }
    }
}

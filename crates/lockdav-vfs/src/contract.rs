//! The storage contract consumed by the WebDAV core.
//!
//! A backend exposes a hierarchical namespace of collections and plain
//! resources addressed by normalized paths (see [`crate::path`]). The
//! WebDAV dispatcher only ever talks to storage through [`Vfs`].

use crate::error::VfsResult;
use async_trait::async_trait;
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite};

/// How a resource stream is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Read from the start of an existing resource.
    Read,
    /// Truncate or create, then write.
    Write,
    /// Create if missing, position at the end.
    Append,
    /// Create if missing, keep content, position at the start.
    ReadWrite,
}

impl StreamMode {
    /// Whether this mode may create the resource.
    pub fn creates(self) -> bool {
        !matches!(self, StreamMode::Read)
    }
}

/// A byte channel to a resource's content.
pub trait VfsStream: AsyncRead + AsyncWrite + AsyncSeek + Send + Unpin {}

impl<T> VfsStream for T where T: AsyncRead + AsyncWrite + AsyncSeek + Send + Unpin {}

/// Boxed stream handed out by [`Vfs::stream`].
pub type BoxedStream = Box<dyn VfsStream>;

/// Metadata of a single resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceProps {
    /// Whether the resource is a collection.
    pub is_collection: bool,
    /// Creation (or status change) time.
    pub created: SystemTime,
    /// Last modification time.
    pub modified: SystemTime,
    /// Opaque version identifier, unquoted.
    pub etag: String,
    /// MIME type (`httpd/unix-directory` for collections).
    pub content_type: String,
    /// Content length in bytes (`None` for collections).
    pub content_length: Option<u64>,
}

/// Content type reported for collections.
pub const COLLECTION_CONTENT_TYPE: &str = "httpd/unix-directory";

/// Guess the MIME type of a plain resource from its name.
pub fn guess_content_type(path: &str) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// Storage backend contract.
///
/// All paths are normalized absolute paths. Implementations must be safe
/// to call from many request tasks at once.
#[async_trait]
pub trait Vfs: Send + Sync {
    /// Open a byte stream on `path`.
    ///
    /// `Read` fails with `NotFound` if the resource does not exist; the
    /// writing modes create it, failing with `ParentMissing` when the parent
    /// collection does not exist. Any mode fails with `IsACollection` on a
    /// collection.
    async fn stream(&self, path: &str, mode: StreamMode) -> VfsResult<BoxedStream>;

    /// Whether `path` is an existing collection.
    async fn is_collection(&self, path: &str) -> VfsResult<bool>;

    /// Create a collection. Fails if `path` exists or its parent is missing.
    async fn mkdir(&self, path: &str) -> VfsResult<()>;

    /// Remove `path` and everything below it.
    async fn remove(&self, path: &str) -> VfsResult<()>;

    /// Copy `src` to `dst`. Non-recursive copies of a collection create an
    /// empty collection.
    async fn copy(&self, src: &str, dst: &str, recursive: bool) -> VfsResult<()>;

    /// Move `src` (and its subtree) to `dst`.
    async fn rename(&self, src: &str, dst: &str) -> VfsResult<()>;

    /// Whether anything exists at `path`.
    async fn exists(&self, path: &str) -> VfsResult<bool>;

    /// Visible child names of the collection at `path`.
    async fn list_children(&self, path: &str) -> VfsResult<Vec<String>>;

    /// Metadata of `path`.
    async fn properties(&self, path: &str) -> VfsResult<ResourceProps>;

    /// Set the modification time of `path`.
    async fn set_modified(&self, path: &str, modified: SystemTime) -> VfsResult<()>;

    /// Whether this backend takes part in WebDAV locking.
    fn locking(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_mode_creates() {
        assert!(!StreamMode::Read.creates());
        assert!(StreamMode::Write.creates());
        assert!(StreamMode::Append.creates());
        assert!(StreamMode::ReadWrite.creates());
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("/a/index.html"), "text/html");
        assert_eq!(guess_content_type("/a/blob"), "application/octet-stream");
    }
}

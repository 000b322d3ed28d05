//! In-memory backend.
//!
//! Mostly used by tests and for throwaway shares. Streams buffer their
//! content and publish it back to the tree on flush, shutdown or drop.

use crate::contract::{
    guess_content_type, BoxedStream, ResourceProps, StreamMode, Vfs, COLLECTION_CONTENT_TYPE,
};
use crate::error::{VfsError, VfsResult};
use crate::path::{self as vpath, ROOT};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::{self, Cursor, SeekFrom};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite, ReadBuf};

#[derive(Debug, Clone)]
struct Entry {
    id: u64,
    collection: bool,
    created: SystemTime,
    modified: SystemTime,
    content: Vec<u8>,
    version: u64,
}

#[derive(Debug)]
struct Tree {
    entries: BTreeMap<String, Entry>,
    next_id: u64,
}

impl Tree {
    fn new() -> Self {
        let mut tree = Self {
            entries: BTreeMap::new(),
            next_id: 1,
        };
        tree.insert(ROOT, true, Vec::new());
        tree
    }

    fn insert(&mut self, path: &str, collection: bool, content: Vec<u8>) {
        let now = SystemTime::now();
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(
            path.to_string(),
            Entry {
                id,
                collection,
                created: now,
                modified: now,
                content,
                version: 0,
            },
        );
    }

    fn get(&self, path: &str) -> VfsResult<&Entry> {
        self.entries
            .get(path)
            .ok_or_else(|| VfsError::NotFound(path.to_string()))
    }

    fn require_parent(&self, path: &str) -> VfsResult<()> {
        let parent = vpath::parent(path).ok_or_else(|| VfsError::PermissionDenied(path.into()))?;
        match self.entries.get(parent) {
            Some(e) if e.collection => Ok(()),
            _ => Err(VfsError::ParentMissing(path.to_string())),
        }
    }

    /// Paths of `path` and everything below it.
    fn subtree(&self, path: &str) -> Vec<String> {
        self.entries
            .range(path.to_string()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(path))
            .filter(|k| k.as_str() == path || vpath::is_descendant(k, path))
            .cloned()
            .collect()
    }

    fn publish(&mut self, path: &str, content: Vec<u8>) {
        let id = self.next_id;
        let entry = self.entries.entry(path.to_string()).or_insert_with(|| {
            let now = SystemTime::now();
            Entry {
                id,
                collection: false,
                created: now,
                modified: now,
                content: Vec::new(),
                version: 0,
            }
        });
        if entry.id == id {
            self.next_id += 1;
        }
        entry.content = content;
        entry.modified = SystemTime::now();
        entry.version += 1;
    }
}

/// A [`Vfs`] keeping everything in process memory.
#[derive(Debug, Clone)]
pub struct MemFs {
    tree: Arc<RwLock<Tree>>,
    locking: bool,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    /// An empty namespace holding only the root collection.
    pub fn new() -> Self {
        Self {
            tree: Arc::new(RwLock::new(Tree::new())),
            locking: true,
        }
    }

    /// Enable or disable participation in WebDAV locking.
    #[must_use]
    pub fn with_locking(mut self, locking: bool) -> Self {
        self.locking = locking;
        self
    }
}

/// Stream over a buffered copy of a resource's content.
struct MemStream {
    tree: Arc<RwLock<Tree>>,
    path: String,
    cursor: Cursor<Vec<u8>>,
    writable: bool,
    dirty: bool,
}

impl MemStream {
    fn commit(&mut self) {
        if self.dirty {
            self.tree
                .write()
                .publish(&self.path, self.cursor.get_ref().clone());
            self.dirty = false;
        }
    }
}

impl Drop for MemStream {
    fn drop(&mut self) {
        self.commit();
    }
}

impl AsyncRead for MemStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.cursor).poll_read(cx, buf)
    }
}

impl AsyncWrite for MemStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if !self.writable {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "stream opened for reading",
            )));
        }
        self.dirty = true;
        Pin::new(&mut self.cursor).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.commit();
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.commit();
        Poll::Ready(Ok(()))
    }
}

impl AsyncSeek for MemStream {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.cursor).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.cursor).poll_complete(cx)
    }
}

#[async_trait]
impl Vfs for MemFs {
    async fn stream(&self, path: &str, mode: StreamMode) -> VfsResult<BoxedStream> {
        let mut tree = self.tree.write();
        let existing = tree
            .entries
            .get(path)
            .map(|e| (e.collection, e.content.clone()));
        let content = match existing {
            Some((true, _)) => return Err(VfsError::IsACollection(path.to_string())),
            Some((false, content)) => match mode {
                StreamMode::Write => Vec::new(),
                _ => content,
            },
            None if mode.creates() => {
                tree.require_parent(path)?;
                tree.insert(path, false, Vec::new());
                Vec::new()
            }
            None => return Err(VfsError::NotFound(path.to_string())),
        };

        let mut cursor = Cursor::new(content);
        if mode == StreamMode::Append {
            cursor.set_position(cursor.get_ref().len() as u64);
        }
        Ok(Box::new(MemStream {
            tree: Arc::clone(&self.tree),
            path: path.to_string(),
            cursor,
            writable: mode.creates(),
            // A truncating open publishes the empty content even if nothing is written.
            dirty: mode == StreamMode::Write,
        }))
    }

    async fn is_collection(&self, path: &str) -> VfsResult<bool> {
        Ok(self
            .tree
            .read()
            .entries
            .get(path)
            .is_some_and(|e| e.collection))
    }

    async fn mkdir(&self, path: &str) -> VfsResult<()> {
        let mut tree = self.tree.write();
        if tree.entries.contains_key(path) {
            return Err(VfsError::AlreadyExists(path.to_string()));
        }
        tree.require_parent(path)?;
        tree.insert(path, true, Vec::new());
        Ok(())
    }

    async fn remove(&self, path: &str) -> VfsResult<()> {
        if path == ROOT {
            return Err(VfsError::PermissionDenied(path.to_string()));
        }
        let mut tree = self.tree.write();
        tree.get(path)?;
        for key in tree.subtree(path) {
            tree.entries.remove(&key);
        }
        Ok(())
    }

    async fn copy(&self, src: &str, dst: &str, recursive: bool) -> VfsResult<()> {
        let mut tree = self.tree.write();
        let source = tree.get(src)?.clone();
        tree.require_parent(dst)?;

        let keys = if source.collection && recursive {
            tree.subtree(src)
        } else {
            vec![src.to_string()]
        };
        for key in keys {
            let Some(entry) = tree.entries.get(&key).cloned() else {
                continue;
            };
            let target = format!("{dst}{}", &key[src.len()..]);
            let id = tree.next_id;
            tree.next_id += 1;
            tree.entries.insert(
                target,
                Entry {
                    id,
                    created: SystemTime::now(),
                    version: 0,
                    ..entry
                },
            );
        }
        Ok(())
    }

    async fn rename(&self, src: &str, dst: &str) -> VfsResult<()> {
        let mut tree = self.tree.write();
        tree.get(src)?;
        tree.require_parent(dst)?;
        if vpath::is_descendant(dst, src) {
            return Err(VfsError::PermissionDenied(dst.to_string()));
        }
        for key in tree.subtree(dst) {
            tree.entries.remove(&key);
        }
        for key in tree.subtree(src) {
            if let Some(entry) = tree.entries.remove(&key) {
                let target = format!("{dst}{}", &key[src.len()..]);
                tree.entries.insert(target, entry);
            }
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> VfsResult<bool> {
        Ok(self.tree.read().entries.contains_key(path))
    }

    async fn list_children(&self, path: &str) -> VfsResult<Vec<String>> {
        let tree = self.tree.read();
        if !tree.get(path)?.collection {
            return Err(VfsError::NotACollection(path.to_string()));
        }
        Ok(tree
            .subtree(path)
            .iter()
            .filter(|k| vpath::parent(k) == Some(path))
            .map(|k| vpath::file_name(k).to_string())
            .collect())
    }

    async fn properties(&self, path: &str) -> VfsResult<ResourceProps> {
        let tree = self.tree.read();
        let entry = tree.get(path)?;
        Ok(ResourceProps {
            is_collection: entry.collection,
            created: entry.created,
            modified: entry.modified,
            etag: format!("{:x}-{:x}-{:x}", entry.id, entry.content.len(), entry.version),
            content_type: if entry.collection {
                COLLECTION_CONTENT_TYPE.to_string()
            } else {
                guess_content_type(path)
            },
            content_length: (!entry.collection).then_some(entry.content.len() as u64),
        })
    }

    async fn set_modified(&self, path: &str, modified: SystemTime) -> VfsResult<()> {
        let mut tree = self.tree.write();
        let entry = tree
            .entries
            .get_mut(path)
            .ok_or_else(|| VfsError::NotFound(path.to_string()))?;
        entry.modified = modified;
        Ok(())
    }

    fn locking(&self) -> bool {
        self.locking
    }
}

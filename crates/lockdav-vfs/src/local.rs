//! Backend serving a directory of the local filesystem.

use crate::contract::{
    guess_content_type, BoxedStream, ResourceProps, StreamMode, Vfs, COLLECTION_CONTENT_TYPE,
};
use crate::error::{VfsError, VfsResult};
use crate::filter::{EntryFilter, HiddenPatterns};
use crate::path;
use async_trait::async_trait;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// A [`Vfs`] rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
    filter: EntryFilter,
    locking: bool,
}

impl LocalFs {
    /// Serve `root` with the default hidden-entry patterns.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let filter = EntryFilter::new(&HiddenPatterns::default())
            .unwrap_or_default();
        Self {
            root: root.into(),
            filter,
            locking: true,
        }
    }

    /// Replace the hidden-entry patterns.
    pub fn with_hidden(mut self, patterns: &HiddenPatterns) -> Result<Self, globset::Error> {
        self.filter = EntryFilter::new(patterns)?;
        Ok(self)
    }

    /// Enable or disable participation in WebDAV locking.
    #[must_use]
    pub fn with_locking(mut self, locking: bool) -> Self {
        self.locking = locking;
        self
    }

    /// The served directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a resource path onto the local filesystem.
    ///
    /// Symlinks inside the root are followed only while they stay inside it.
    async fn resolve(&self, path: &str) -> VfsResult<PathBuf> {
        if self.filter.is_undisclosed(path) {
            trace!(path = %path, "undisclosed entry");
            return Err(VfsError::NotFound(path.to_string()));
        }
        let mut local = self.root.clone();
        for segment in path::segments(path) {
            if segment == ".." || segment == "." {
                return Err(VfsError::NotFound(path.to_string()));
            }
            local.push(segment);
        }
        self.contain(&local, path).await?;
        Ok(local)
    }

    /// Fail with `PermissionDenied` when `local` really points outside the root.
    async fn contain(&self, local: &Path, path: &str) -> VfsResult<()> {
        let mut probe = local.to_path_buf();
        // The longest existing prefix decides where the path lands.
        let real = loop {
            match fs::canonicalize(&probe).await {
                Ok(real) => break real,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    if fs::symlink_metadata(&probe).await.is_ok() {
                        debug!(path = %path, "dangling symlink");
                        return Err(VfsError::PermissionDenied(path.to_string()));
                    }
                    if !probe.pop() {
                        return Ok(());
                    }
                }
                Err(e) => return Err(VfsError::from_io(e, path)),
            }
        };
        let root = fs::canonicalize(&self.root)
            .await
            .map_err(|e| VfsError::from_io(e, path))?;
        if real.starts_with(&root) {
            Ok(())
        } else {
            debug!(path = %path, target = %real.display(), "symlink escapes root");
            Err(VfsError::PermissionDenied(path.to_string()))
        }
    }

    /// Fail with `ParentMissing` unless the parent of `path` is a directory.
    async fn require_parent(&self, path: &str) -> VfsResult<()> {
        let Some(parent) = path::parent(path) else {
            return Err(VfsError::PermissionDenied(path.to_string()));
        };
        let local = self.resolve(parent).await?;
        match fs::metadata(&local).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(VfsError::ParentMissing(path.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(VfsError::ParentMissing(path.to_string()))
            }
            Err(e) => Err(VfsError::from_io(e, parent)),
        }
    }

    async fn metadata(&self, path: &str) -> VfsResult<Metadata> {
        let local = self.resolve(path).await?;
        fs::symlink_metadata(&local)
            .await
            .map_err(|e| VfsError::from_io(e, path))
    }
}

/// Run blocking filesystem work off the async executor.
async fn blocking<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(io::Error::other)?
}

fn etag_for(meta: &Metadata) -> String {
    #[cfg(unix)]
    let ino = {
        use std::os::unix::fs::MetadataExt;
        meta.ino()
    };
    #[cfg(not(unix))]
    let ino = 0u64;

    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_nanos());
    format!("{ino:x}-{:x}-{mtime:x}", meta.len())
}

/// Copy a single file, carrying over its modification time.
fn copy_file(src: &Path, dst: &Path) -> io::Result<()> {
    std::fs::copy(src, dst)?;
    if let Ok(modified) = std::fs::metadata(src).and_then(|m| m.modified()) {
        let file = std::fs::OpenOptions::new().write(true).open(dst)?;
        file.set_modified(modified)?;
    }
    Ok(())
}

/// Create `dst` as a directory carrying the modification time of `src`.
fn copy_dir_shallow(src: &Path, dst: &Path) -> io::Result<()> {
    std::fs::create_dir(dst)?;
    if let Ok(modified) = std::fs::metadata(src).and_then(|m| m.modified()) {
        // Best effort: some platforms refuse timestamps on directories.
        if let Ok(dir) = std::fs::File::open(dst) {
            let _ = dir.set_modified(modified);
        }
    }
    Ok(())
}

fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            copy_dir_shallow(entry.path(), &target)?;
        } else {
            copy_file(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[async_trait]
impl Vfs for LocalFs {
    async fn stream(&self, path: &str, mode: StreamMode) -> VfsResult<BoxedStream> {
        let local = self.resolve(path).await?;

        match fs::metadata(&local).await {
            Ok(meta) if meta.is_dir() => return Err(VfsError::IsACollection(path.to_string())),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound && mode.creates() => {
                self.require_parent(path).await?;
            }
            Err(e) => return Err(VfsError::from_io(e, path)),
        }

        let mut options = fs::OpenOptions::new();
        match mode {
            StreamMode::Read => options.read(true),
            StreamMode::Write => options.write(true).create(true).truncate(true),
            StreamMode::Append => options.append(true).create(true),
            StreamMode::ReadWrite => options.read(true).write(true).create(true),
        };

        let file = options
            .open(&local)
            .await
            .map_err(|e| VfsError::from_io(e, path))?;
        debug!(path = %path, ?mode, "opened local stream");
        Ok(Box::new(file))
    }

    async fn is_collection(&self, path: &str) -> VfsResult<bool> {
        match self.metadata(path).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(VfsError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn mkdir(&self, path: &str) -> VfsResult<()> {
        let local = self.resolve(path).await?;
        fs::create_dir(&local).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => VfsError::ParentMissing(path.to_string()),
            _ => VfsError::from_io(e, path),
        })
    }

    async fn remove(&self, path: &str) -> VfsResult<()> {
        if path == path::ROOT {
            return Err(VfsError::PermissionDenied(path.to_string()));
        }
        let local = self.resolve(path).await?;
        let meta = self.metadata(path).await?;
        let result = if meta.is_dir() {
            fs::remove_dir_all(&local).await
        } else {
            fs::remove_file(&local).await
        };
        result.map_err(|e| VfsError::from_io(e, path))
    }

    async fn copy(&self, src: &str, dst: &str, recursive: bool) -> VfsResult<()> {
        let from = self.resolve(src).await?;
        let to = self.resolve(dst).await?;
        let meta = self.metadata(src).await?;
        self.require_parent(dst).await?;

        debug!(src = %src, dst = %dst, recursive, "local copy");
        let is_dir = meta.is_dir();
        blocking(move || match (is_dir, recursive) {
            (true, true) => copy_tree(&from, &to),
            (true, false) => copy_dir_shallow(&from, &to),
            (false, _) => copy_file(&from, &to),
        })
        .await
        .map_err(|e| VfsError::from_io(e, dst))
    }

    async fn rename(&self, src: &str, dst: &str) -> VfsResult<()> {
        let from = self.resolve(src).await?;
        let to = self.resolve(dst).await?;
        self.metadata(src).await?;
        self.require_parent(dst).await?;
        fs::rename(&from, &to)
            .await
            .map_err(|e| VfsError::from_io(e, dst))
    }

    async fn exists(&self, path: &str) -> VfsResult<bool> {
        match self.metadata(path).await {
            Ok(_) => Ok(true),
            Err(VfsError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_children(&self, path: &str) -> VfsResult<Vec<String>> {
        let local = self.resolve(path).await?;
        let mut entries = fs::read_dir(&local)
            .await
            .map_err(|e| VfsError::from_io(e, path))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| VfsError::from_io(e, path))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.filter.is_unlisted(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn properties(&self, path: &str) -> VfsResult<ResourceProps> {
        let meta = self.metadata(path).await?;
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let created = meta.created().unwrap_or(modified);
        let is_collection = meta.is_dir();

        Ok(ResourceProps {
            is_collection,
            created,
            modified,
            etag: etag_for(&meta),
            content_type: if is_collection {
                COLLECTION_CONTENT_TYPE.to_string()
            } else {
                guess_content_type(path)
            },
            content_length: (!is_collection).then(|| meta.len()),
        })
    }

    async fn set_modified(&self, path: &str, modified: SystemTime) -> VfsResult<()> {
        let local = self.resolve(path).await?;
        blocking(move || std::fs::File::open(&local)?.set_modified(modified))
            .await
            .map_err(|e| VfsError::from_io(e, path))
    }

    fn locking(&self) -> bool {
        self.locking
    }
}

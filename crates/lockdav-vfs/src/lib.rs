//! Storage layer for the lockdav WebDAV server.
//!
//! The WebDAV core never touches storage directly; it goes through the
//! [`Vfs`] trait. Two backends are provided:
//!
//! - [`LocalFs`] serves a directory of the local filesystem, hiding entries
//!   matched by [`HiddenPatterns`]
//! - [`MemFs`] keeps a namespace in process memory
//!
//! Backends classify their failures as [`VfsError`] so the HTTP layer can
//! map them onto status codes without knowing the backend.

pub mod contract;
pub mod error;
pub mod filter;
pub mod local;
pub mod memory;
pub mod path;

pub use contract::{
    BoxedStream, COLLECTION_CONTENT_TYPE, ResourceProps, StreamMode, Vfs, VfsStream,
    guess_content_type,
};
pub use error::{VfsError, VfsResult};
pub use filter::{EntryFilter, HiddenPatterns};
pub use local::LocalFs;
pub use memory::MemFs;

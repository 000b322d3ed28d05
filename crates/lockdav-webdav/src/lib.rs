//! WebDAV class 1 and 2 server core.
//!
//! This crate turns HTTP requests into operations on a
//! [`lockdav_vfs::Vfs`] backend and keeps a process-wide table of write
//! locks.
//!
//! # How It Works
//!
//! 1. [`WebDavServer`] accepts connections and hands each request to a
//!    shared [`DavDispatcher`]
//! 2. The dispatcher resolves the request path (prefix, client encoding,
//!    percent-decoding) and runs the handler for the method
//! 3. Mutating handlers ask the [`LockManager`] whether the target is locked
//!    and, if so, whether the `If` header carries a matching token
//!
//! # Example
//!
//! ```ignore
//! use lockdav_vfs::LocalFs;
//! use lockdav_webdav::{DavDispatcher, LockManager, ServerConfig, WebDavServer};
//! use std::sync::Arc;
//!
//! let dispatcher = DavDispatcher::new(
//!     Arc::new(LocalFs::new("/srv/share")),
//!     Arc::new(LockManager::default()),
//! );
//! let server = WebDavServer::start(dispatcher, ServerConfig::default()).await?;
//! println!("Serving on {}", server.url());
//! ```
//!
//! # Security
//!
//! By default, the server binds to localhost (127.0.0.1) only. Basic
//! `Authorization` headers are read to bind locks to a user; they are never
//! verified.

pub mod body;
pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod headers;
pub mod locks;
pub mod multistatus;
pub mod props;
pub mod server;
pub mod status;
pub mod xml;

// Public exports
pub use codec::{CodecConfig, Platform, RequestCodec};
pub use dispatcher::{ALLOWED_METHODS, DavDispatcher, DavMethod};
pub use error::{DavError, DavResult};
pub use locks::{
    Clock, Lock, LockConfig, LockDepth, LockManager, LockRequest, LockScope, LockTimeout,
    ManualClock, Owner, SystemClock,
};
pub use multistatus::{MultistatusBuilder, PropStat};
pub use props::PropertyResolver;
pub use server::{ServerConfig, WebDavServer};

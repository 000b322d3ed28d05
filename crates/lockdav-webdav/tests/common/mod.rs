//! Common test utilities for WebDAV integration tests.

pub mod assertions;
pub mod dav;
pub mod harness;

pub use assertions::*;
pub use dav::*;
pub use harness::*;

//! Process exit codes.

/// Clean shutdown.
pub const SUCCESS: u8 = 0;

/// Runtime failure (bind error, I/O, server crash).
pub const GENERAL_ERROR: u8 = 1;

/// Bad command line or configuration file.
pub const USAGE_ERROR: u8 = 2;

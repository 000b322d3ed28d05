//! Configuration file loading.
//!
//! The file is TOML with four optional sections:
//!
//! ```toml
//! [server]
//! port = 8080
//! bind = "127.0.0.1"
//! prefix = "/dav"
//!
//! [storage]
//! backend = "local"        # or "memory"
//! root = "/srv/webdav"
//! locking = true
//! not_in_list = [".*"]
//! nondisclosure = [".ht*"]
//!
//! [locks]
//! default_timeout = "1h"
//!
//! [codec]
//! windows_client = "CP932"
//! ```
//!
//! Every key has a default, so a missing file is the same as an empty one.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use lockdav_vfs::HiddenPatterns;
use lockdav_webdav::{CodecConfig, LockConfig, ServerConfig};

/// Port used when neither the file nor the command line names one.
pub const DEFAULT_PORT: u16 = 8080;

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine the configuration directory")]
    NoConfigDir,

    #[error("Failed to read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerSection,
    pub storage: StorageSection,
    pub locks: LocksSection,
    pub codec: CodecSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub port: u16,
    pub bind: IpAddr,
    /// URL path the server is mounted under, e.g. `/dav`.
    pub prefix: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            prefix: String::new(),
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// A directory on the local filesystem
    #[default]
    Local,
    /// A namespace held in process memory, lost on exit
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    pub backend: Backend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    pub locking: bool,
    pub not_in_list: Vec<String>,
    pub nondisclosure: Vec<String>,
}

impl Default for StorageSection {
    fn default() -> Self {
        let hidden = HiddenPatterns::default();
        Self {
            backend: Backend::default(),
            root: None,
            locking: true,
            not_in_list: hidden.not_in_list,
            nondisclosure: hidden.nondisclosure,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocksSection {
    /// Lifetime of locks whose request names no timeout. Unset means infinite.
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub default_timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodecSection {
    pub default_client: String,
    pub windows_client: String,
    pub mac_client: String,
    pub unix_client: String,
}

impl Default for CodecSection {
    fn default() -> Self {
        let codec = CodecConfig::default();
        Self {
            default_client: codec.default_client,
            windows_client: codec.windows_client,
            mac_client: codec.mac_client,
            unix_client: codec.unix_client,
        }
    }
}

impl Config {
    /// `config.toml` in the platform configuration directory.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dirs = directories::ProjectDirs::from("org", "lockdav", "lockdav")
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load from `explicit` if given, which must then exist, or from the
    /// default location, falling back to defaults when nothing is there.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::read(path);
        }

        let path = match Self::default_path() {
            Ok(path) => path,
            Err(e) => {
                tracing::debug!(error = %e, "no configuration directory, using defaults");
                return Ok(Self::default());
            }
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::read(&path)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Checks that only make sense once command-line overrides are applied.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = &self.server.prefix;
        if !prefix.is_empty() && !prefix.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "server prefix must start with '/': {prefix}"
            )));
        }
        if self.storage.backend == Backend::Local {
            let Some(root) = &self.storage.root else {
                return Err(ConfigError::Invalid(
                    "the local backend needs a root directory (storage.root or ROOT)".into(),
                ));
            };
            if !root.is_dir() {
                return Err(ConfigError::Invalid(format!(
                    "root is not a directory: {}",
                    root.display()
                )));
            }
        }
        Ok(())
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            port: self.server.port,
            bind_address: self.server.bind,
            prefix: self.server.prefix.clone(),
        }
    }

    pub fn lock_config(&self) -> LockConfig {
        LockConfig {
            default_timeout: self.locks.default_timeout,
        }
    }

    pub fn codec_config(&self) -> CodecConfig {
        CodecConfig {
            default_client: self.codec.default_client.clone(),
            windows_client: self.codec.windows_client.clone(),
            mac_client: self.codec.mac_client.clone(),
            unix_client: self.codec.unix_client.clone(),
        }
    }

    pub fn hidden_patterns(&self) -> HiddenPatterns {
        HiddenPatterns {
            not_in_list: self.storage.not_in_list.clone(),
            nondisclosure: self.storage.nondisclosure.clone(),
        }
    }
}

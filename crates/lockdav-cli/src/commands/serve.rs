//! Serve command - run the WebDAV server until Ctrl+C.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::{info, instrument};

use lockdav_vfs::{LocalFs, MemFs, Vfs};
use lockdav_webdav::{DavDispatcher, LockManager, RequestCodec, WebDavServer};

use crate::config::{Backend, Config, ConfigError, StorageSection};

#[derive(ClapArgs, Clone, Debug, Default)]
pub struct Args {
    /// Directory to serve (overrides storage.root)
    #[arg(value_name = "ROOT")]
    pub root: Option<PathBuf>,

    /// Serve an in-memory namespace instead of a directory
    #[arg(long, conflicts_with = "root")]
    pub memory: bool,

    /// Port to listen on (0 picks a free port)
    #[arg(short, long, env = "LOCKDAV_PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(short, long, env = "LOCKDAV_BIND")]
    pub bind: Option<IpAddr>,

    /// URL path to serve under, e.g. /dav
    #[arg(long)]
    pub prefix: Option<String>,

    /// Disable LOCK/UNLOCK
    #[arg(long)]
    pub no_locking: bool,

    /// Timeout for locks that request none, e.g. "10m" or "1h"
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub lock_timeout: Option<Duration>,
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

impl Args {
    /// Fold command-line values over the file configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(root) = &self.root {
            config.storage.backend = Backend::Local;
            config.storage.root = Some(root.clone());
        }
        if self.memory {
            config.storage.backend = Backend::Memory;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(prefix) = &self.prefix {
            config.server.prefix = prefix.trim_end_matches('/').to_string();
        }
        if self.no_locking {
            config.storage.locking = false;
        }
        if self.lock_timeout.is_some() {
            config.locks.default_timeout = self.lock_timeout;
        }
    }
}

#[instrument(level = "info", name = "cmd::serve", skip_all)]
pub fn execute(args: &Args, mut config: Config) -> Result<()> {
    args.apply(&mut config);
    config.validate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(serve(config))
}

async fn serve(config: Config) -> Result<()> {
    let vfs = build_vfs(&config)?;
    let locks = Arc::new(LockManager::new(config.lock_config()));
    let dispatcher = DavDispatcher::new(vfs, locks).with_codec(RequestCodec::new(config.codec_config()));

    let server_config = config.server_config();
    let server = WebDavServer::start(dispatcher, server_config.clone())
        .await
        .with_context(|| {
            format!(
                "Failed to bind {}:{}",
                server_config.bind_address, server_config.port
            )
        })?;

    info!(
        url = %server.url(),
        backend = ?config.storage.backend,
        locking = config.storage.locking,
        "serving"
    );
    eprintln!("Serving {} at {}", describe(&config.storage), server.url());
    eprintln!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    eprintln!("Shutting down...");
    server.stop().await;
    info!("server stopped");
    Ok(())
}

fn build_vfs(config: &Config) -> Result<Arc<dyn Vfs>> {
    let storage = &config.storage;
    match storage.backend {
        Backend::Memory => Ok(Arc::new(MemFs::new().with_locking(storage.locking))),
        Backend::Local => {
            let root = storage
                .root
                .clone()
                .ok_or_else(|| ConfigError::Invalid("no root directory configured".into()))?;
            let fs = LocalFs::new(root)
                .with_hidden(&config.hidden_patterns())
                .map_err(|e| ConfigError::Invalid(format!("invalid hidden-entry pattern: {e}")))?
                .with_locking(storage.locking);
            Ok(Arc::new(fs))
        }
    }
}

fn describe(storage: &StorageSection) -> String {
    match (&storage.backend, &storage.root) {
        (Backend::Local, Some(root)) => root.display().to_string(),
        (Backend::Local, None) => "nothing".to_string(),
        (Backend::Memory, _) => "an in-memory namespace".to_string(),
    }
}

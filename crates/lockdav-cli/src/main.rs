#![deny(unsafe_code)]

mod commands;
mod config;
mod exit_code;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
#[cfg(feature = "tokio-console")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{serve, show_config};
use crate::config::{Config, ConfigError};

/// WebDAV server with hierarchical locking
#[derive(Parser)]
#[command(name = "lockdav")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Serve a directory on port 8080
    lockdav serve ~/shared

    # Serve under /dav on all interfaces, locks expire after 10 minutes
    lockdav serve ~/shared --bind 0.0.0.0 --prefix /dav --lock-timeout 10m

    # Throwaway in-memory share on a random port
    lockdav -v serve --memory --port 0

    # Show the configuration in effect (~/.config/lockdav/config.toml)
    lockdav config
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress log output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, value_name = "FILE", env = "LOCKDAV_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a directory (or an in-memory namespace) over WebDAV
    Serve(serve::Args),

    /// Print the effective configuration
    Config(show_config::Args),
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(categorize_error(&e))
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if !cli.quiet {
        setup_tracing(cli.verbose);
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve(args) => serve::execute(&args, config),
        Commands::Config(args) => show_config::execute(&args, &config, cli.config.as_deref()),
    }
}

/// Set up tracing/logging based on verbosity level
fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    #[cfg(feature = "tokio-console")]
    {
        use tracing_subscriber::Layer;

        let fmt_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());
        tracing_subscriber::registry()
            .with(console_subscriber::spawn())
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr).with_filter(fmt_filter))
            .init();
    }

    #[cfg(not(feature = "tokio-console"))]
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}

/// Map an error chain onto an exit code.
fn categorize_error(e: &anyhow::Error) -> u8 {
    if e.chain().any(|cause| cause.downcast_ref::<ConfigError>().is_some()) {
        exit_code::USAGE_ERROR
    } else {
        exit_code::GENERAL_ERROR
    }
}

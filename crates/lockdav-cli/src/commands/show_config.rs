//! Config command - print the effective configuration.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;

use crate::config::Config;

#[derive(ClapArgs, Clone, Debug)]
pub struct Args {
    /// Print where the configuration file is looked up instead of its contents
    #[arg(long)]
    pub path: bool,
}

pub fn execute(args: &Args, config: &Config, explicit: Option<&Path>) -> Result<()> {
    if args.path {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => Config::default_path()?,
        };
        println!("{}", path.display());
        return Ok(());
    }

    let text = config
        .to_toml()
        .context("Failed to render configuration")?;
    print!("{text}");
    Ok(())
}

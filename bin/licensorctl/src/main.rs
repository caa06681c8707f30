//! ---
//! lic_section: "06-binaries"
//! lic_subsection: "binary"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Administrative CLI over the configured license store."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser};
use licensor_common::config::{AppConfig, StoreBackend};
use licensor_common::{build_engine, init_cli_tracing, open_store, VersionInfo};
use tracing::warn;

mod commands;

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    about = "Licensor administrative utility",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,
    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print extended version information and exit"
    )]
    version: bool,
    #[command(subcommand)]
    command: Option<commands::Command>,
}

fn main() -> Result<()> {
    init_cli_tracing();
    let cli = Cli::parse();
    if cli.version {
        println!("{}", VersionInfo::current().extended());
        return Ok(());
    }
    let Some(command) = cli.command else {
        eprintln!("no command given; see --help");
        return Ok(());
    };

    let mut candidates = Vec::new();
    if let Some(path) = cli.config {
        candidates.push(path);
    }
    candidates.push(PathBuf::from("configs/licensor.toml"));
    candidates.push(PathBuf::from("/etc/licensor/licensor.toml"));
    let config = AppConfig::load(&candidates)?;
    if config.store.backend == StoreBackend::Memory {
        warn!("store backend is in-memory; changes are discarded when the command exits");
    }

    let store = open_store(&config.store)?;
    let engine = build_engine(&config, store.clone(), None)?;
    println!("{}", commands::run(command, &engine, store.as_ref())?);
    Ok(())
}

//! ---
//! lic_section: "06-binaries"
//! lic_subsection: "binary"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Binary entrypoint for the Licensor daemon."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use licensor_api::{spawn_api_server, ApiState};
use licensor_common::config::AppConfig;
use licensor_common::{build_engine, init_tracing, open_store, VersionInfo};
use licensor_security::{AccessGateway, AccessPolicy, AuditLog, GatewayMetrics, TokenService};
use prometheus::Registry;
use rand::RngCore;
use tokio::signal;
use tracing::{info, warn};

const EPHEMERAL_SECRET_LEN: usize = 48;

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    about = "Licensor license entitlement daemon",
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
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum Commands {
    #[command(about = "Serve the license API until interrupted")]
    Serve,
    #[command(about = "Load and validate the configuration, then exit")]
    CheckConfig,
}

fn config_candidates(explicit: Option<&PathBuf>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/licensor.toml"));
    candidates.push(PathBuf::from("/etc/licensor/licensor.toml"));
    candidates
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let version = VersionInfo::current();
    if cli.version {
        println!("{}", version.extended());
        return Ok(());
    }

    let loaded = AppConfig::load_with_source(&config_candidates(cli.config.as_ref()))?;
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::CheckConfig => {
            println!("{}: configuration is valid", loaded.source.display());
            Ok(())
        }
        Commands::Serve => {
            init_tracing("licensord", &loaded.config.logging)?;
            info!(config = %loaded.source.display(), version = %version.banner(), "configuration loaded");
            run_daemon(loaded.config, version).await
        }
    }
}

async fn run_daemon(config: AppConfig, version: VersionInfo) -> Result<()> {
    let registry = if config.metrics.enabled {
        Some(Arc::new(Registry::new()))
    } else {
        info!("metrics disabled by configuration");
        None
    };

    let store = open_store(&config.store)?;
    let engine = Arc::new(build_engine(&config, store, registry.clone())?);
    info!(
        issuer = %engine.issuer().id(),
        licenses = engine.count()?,
        "entitlement engine ready"
    );

    if !config.api.enabled {
        warn!("api server disabled by configuration; nothing to serve");
        return Ok(());
    }

    let secret = match &config.api.token_secret {
        Some(secret) => secret.clone().into_bytes(),
        None => {
            warn!("api.token_secret not set; bearer tokens are signed with a per-process secret");
            ephemeral_secret()
        }
    };
    let mut gateway = AccessGateway::new(
        engine.clone(),
        TokenService::new(&secret, config.api.token_ttl),
        AccessPolicy::new(),
    );
    if let Some(registry) = &registry {
        gateway = gateway.with_metrics(
            GatewayMetrics::new(registry.clone()).context("failed to register gateway metrics")?,
        );
    }

    let mut state = ApiState::new(engine, Arc::new(gateway), version);
    if let Some(registry) = registry {
        state = state.with_registry(registry);
    }
    if let Some(path) = &config.audit.path {
        let log = AuditLog::open(path)
            .with_context(|| format!("unable to open audit log {}", path.display()))?;
        info!(path = %path.display(), "audit trail enabled");
        state = state.with_audit(log);
    }

    let server = spawn_api_server(Arc::new(state), config.api.listen)?;
    info!(address = %server.addr(), "daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    server.shutdown().await
}

fn ephemeral_secret() -> Vec<u8> {
    let mut secret = vec![0u8; EPHEMERAL_SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

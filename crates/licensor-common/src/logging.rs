//! ---
//! lic_section: "05-runtime-common"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Tracing subscriber setup for the Licensor services."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Registry;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "LICENSOR_LOG";
const DEFAULT_DIRECTIVE: &str = "info";
const DEFAULT_FILE_PREFIX: &str = "licensor";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Flush guards of the non-blocking writers; dropping them loses buffered records.
struct LogGuards {
    _stdout: WorkerGuard,
    _file: WorkerGuard,
}

static GUARDS: OnceCell<LogGuards> = OnceCell::new();

/// Console output style of the daemon. The log file is always JSON.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Install the daemon subscriber: console in `config.format` plus a daily
/// rolling JSON file `<prefix>-<service>.log` under `config.directory`.
///
/// The filter comes from `LICENSOR_LOG`, then `RUST_LOG`, then `info`.
/// Calling this a second time leaves the first subscriber in place.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!("unable to create log directory {}", config.directory.display())
    })?;
    let file_name = log_file_name(config.file_prefix.as_deref(), service_name);
    let (file_writer, file_guard) =
        tracing_appender::non_blocking(rolling::daily(&config.directory, &file_name));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let installed = tracing_subscriber::registry()
        .with(vec![
            console_layer(config.format, stdout_writer),
            json_file_layer(file_writer),
        ])
        .with(env_filter())
        .try_init()
        .is_ok();
    if installed {
        let _ = GUARDS.set(LogGuards {
            _stdout: stdout_guard,
            _file: file_guard,
        });
    }

    info!(
        service = %service_name,
        log_file = %Path::new(&config.directory).join(&file_name).display(),
        format = ?config.format,
        "tracing initialised"
    );
    Ok(())
}

/// Plain stderr subscriber for command line tools.
pub fn init_cli_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}

fn console_layer(format: LogFormat, writer: NonBlocking) -> BoxedLayer {
    let layer = fmt::layer().with_timer(UtcTime::rfc_3339()).with_writer(writer);
    match format {
        LogFormat::StructuredJson => layer.with_target(false).json().boxed(),
        LogFormat::Pretty => layer.with_target(true).boxed(),
    }
}

fn json_file_layer(writer: NonBlocking) -> BoxedLayer {
    fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_ansi(false)
        .json()
        .with_writer(writer)
        .boxed()
}

fn log_file_name(prefix: Option<&str>, service_name: &str) -> String {
    let prefix = prefix
        .map(str::trim)
        .filter(|prefix| !prefix.is_empty())
        .unwrap_or(DEFAULT_FILE_PREFIX);
    format!("{prefix}-{service_name}.log")
}

fn env_filter() -> EnvFilter {
    filter_from(std::env::var(LOG_ENV).ok())
}

fn filter_from(directive: Option<String>) -> EnvFilter {
    let Some(directive) = directive else {
        return EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    };
    EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!("ignoring {LOG_ENV}={directive:?} ({err}); using {DEFAULT_DIRECTIVE}");
        EnvFilter::new(DEFAULT_DIRECTIVE)
    })
}

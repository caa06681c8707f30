//! ---
//! lic_section: "05-runtime-common"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "TOML configuration for the Licensor services."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use licensor_engine::{EnginePolicy, IssuerIdentity, DEFAULT_MAX_CHAIN_HOPS, DEFAULT_TERM_DAYS};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

/// Minimum length of the bearer token signing secret, in bytes.
pub const MIN_TOKEN_SECRET_LEN: usize = 32;

fn default_issuer_name() -> String {
    "Licensor".to_owned()
}

fn default_support_url() -> String {
    "https://licensor.invalid/support".to_owned()
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Sqlite
}

fn default_store_path() -> Option<PathBuf> {
    Some(PathBuf::from("target/licensor/licenses.db"))
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 8080))
}

fn default_token_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_max_chain_hops() -> usize {
    DEFAULT_MAX_CHAIN_HOPS
}

fn default_term_days() -> u32 {
    DEFAULT_TERM_DAYS as u32
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

/// Primary configuration object for the Licensor services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub issuer: IssuerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "LICENSOR_CONFIG";
    pub const ENV_ISSUER_SECRET: &'static str = "LICENSOR_ISSUER_SECRET";
    pub const ENV_TOKEN_SECRET: &'static str = "LICENSOR_TOKEN_SECRET";

    /// Load configuration from disk, respecting the `LICENSOR_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path.to_path_buf(),
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    /// Parse, apply environment secret overrides and validate the file at `path`.
    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let mut config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.apply_overrides(|name| std::env::var(name).ok());
        config
            .validate()
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Replace secrets with values supplied by `lookup` (normally the process environment).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secret) = lookup(Self::ENV_ISSUER_SECRET).filter(|s| !s.is_empty()) {
            self.issuer.secret = secret;
        }
        if let Some(secret) = lookup(Self::ENV_TOKEN_SECRET).filter(|s| !s.is_empty()) {
            self.api.token_secret = Some(secret);
        }
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.issuer.validate()?;
        self.store.validate()?;
        self.api.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// The vendor account that provisions licenses.
#[derive(Clone, Serialize, Deserialize)]
pub struct IssuerConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_issuer_name")]
    pub name: String,
    #[serde(default = "default_support_url")]
    pub support_url: String,
}

impl IssuerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(anyhow!("issuer.id must not be empty"));
        }
        if self.secret.is_empty() {
            return Err(anyhow!(
                "issuer.secret must be set (or provided via {})",
                AppConfig::ENV_ISSUER_SECRET
            ));
        }
        Ok(())
    }

    pub fn identity(&self) -> IssuerIdentity {
        IssuerIdentity::new(
            self.id.clone(),
            self.secret.clone(),
            self.name.clone(),
            self.support_url.clone(),
        )
    }
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            secret: String::new(),
            name: default_issuer_name(),
            support_url: default_support_url(),
        }
    }
}

impl std::fmt::Debug for IssuerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("support_url", &self.support_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.backend == StoreBackend::Sqlite
            && self
                .path
                .as_ref()
                .map_or(true, |path| path.as_os_str().is_empty())
        {
            return Err(anyhow!("store.path is required for the sqlite backend"));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_store_path(),
        }
    }
}

#[serde_as]
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_token_ttl")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub token_ttl: Duration,
    /// HS256 signing secret. When unset the daemon generates one per process.
    #[serde(default)]
    pub token_secret: Option<String>,
}

impl ApiConfig {
    pub fn validate(&self) -> Result<()> {
        if self.token_ttl.is_zero() {
            return Err(anyhow!("api.token_ttl must be positive"));
        }
        if let Some(secret) = &self.token_secret {
            if secret.len() < MIN_TOKEN_SECRET_LEN {
                return Err(anyhow!(
                    "api.token_secret must be at least {MIN_TOKEN_SECRET_LEN} bytes"
                ));
            }
        }
        Ok(())
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_api_listen(),
            token_ttl: default_token_ttl(),
            token_secret: None,
        }
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("enabled", &self.enabled)
            .field("listen", &self.listen)
            .field("token_ttl", &self.token_ttl)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_chain_hops")]
    pub max_chain_hops: usize,
    #[serde(default = "default_term_days")]
    pub default_term_days: u32,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_chain_hops == 0 {
            return Err(anyhow!("engine.max_chain_hops must be at least 1"));
        }
        if self.default_term_days == 0 {
            return Err(anyhow!("engine.default_term_days must be at least 1"));
        }
        Ok(())
    }

    pub fn policy(&self) -> EnginePolicy {
        EnginePolicy {
            max_chain_hops: self.max_chain_hops,
            default_term: chrono::Duration::days(i64::from(self.default_term_days)),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_chain_hops: default_max_chain_hops(),
            default_term_days: default_term_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

/// Exposure of the Prometheus registry on the API listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

/// Hash-chained audit trail of license mutations. Disabled when `path` is unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

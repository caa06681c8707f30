//! ---
//! lic_section: "05-runtime-common"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Store and engine construction from configuration."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use licensor_engine::{EngineMetrics, EntitlementEngine};
use licensor_store::{LicenseStore, MemoryStore, SqliteStore};
use prometheus::Registry;
use tracing::info;

use crate::config::{AppConfig, StoreBackend, StoreConfig};

/// Open the backend selected by `config`.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn LicenseStore>> {
    let store: Arc<dyn LicenseStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Sqlite => {
            let path = config
                .path
                .as_deref()
                .ok_or_else(|| anyhow!("store.path is required for the sqlite backend"))?;
            let store = SqliteStore::open(path)
                .with_context(|| format!("unable to open license database {}", path.display()))?;
            Arc::new(store)
        }
    };
    info!(backend = store.backend_name(), "license store ready");
    Ok(store)
}

/// Build the engine for `config` over `store`, registering metrics when a registry is given.
pub fn build_engine(
    config: &AppConfig,
    store: Arc<dyn LicenseStore>,
    registry: Option<Arc<Registry>>,
) -> Result<EntitlementEngine> {
    let engine = EntitlementEngine::new(store, config.issuer.identity(), config.engine.policy());
    match registry {
        Some(registry) => {
            let metrics =
                EngineMetrics::new(registry).context("failed to register engine metrics")?;
            Ok(engine.with_metrics(metrics))
        }
        None => Ok(engine),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_store_is_created_at_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            backend: StoreBackend::Sqlite,
            path: Some(dir.path().join("nested/licenses.db")),
        };
        let store = open_store(&config).unwrap();
        assert_eq!(store.backend_name(), "sqlite");
        assert!(dir.path().join("nested/licenses.db").exists());
    }

    #[test]
    fn engine_registers_metrics() {
        let config: AppConfig = "[issuer]\nid = \"vendor\"\nsecret = \"s\"\n".parse().unwrap();
        let registry = Arc::new(Registry::new());
        let engine = build_engine(
            &config,
            Arc::new(MemoryStore::new()),
            Some(registry.clone()),
        )
        .unwrap();
        assert_eq!(engine.count().unwrap(), 0);
        assert!(!registry.gather().is_empty());
    }
}

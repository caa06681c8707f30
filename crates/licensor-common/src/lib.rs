//! ---
//! lic_section: "05-runtime-common"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Shared runtime primitives crate root."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
//! Configuration loading, logging, version metadata and bootstrap helpers
//! shared by the Licensor binaries.

pub mod bootstrap;
pub mod config;
pub mod logging;
pub mod version;

pub use bootstrap::{build_engine, open_store};
pub use config::{
    ApiConfig, AppConfig, AuditConfig, EngineConfig, IssuerConfig, LoadedAppConfig,
    LoggingConfig, MetricsConfig, StoreBackend, StoreConfig,
};
pub use logging::{init_cli_tracing, init_tracing, LogFormat};
pub use version::VersionInfo;

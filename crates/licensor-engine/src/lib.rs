//! ---
//! lic_section: "02-entitlement-engine"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Entitlement engine crate root."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
//! Decides whether license keys may be bound to requesting entities, resolves
//! upgrade chains, releases bindings and guards record uniqueness.

pub mod chain;
pub mod engine;
pub mod error;
pub mod issuer;
pub mod metrics;
pub mod requests;

pub use engine::{EnginePolicy, EntitlementEngine, DEFAULT_MAX_CHAIN_HOPS, DEFAULT_TERM_DAYS};
pub use error::{EntitlementError, Result};
pub use issuer::IssuerIdentity;
pub use metrics::EngineMetrics;
pub use requests::{
    BindRequest, CreateLicense, ExpirationPolicy, LicenseRef, ReleaseRequest, UpdateLicense,
    UpsertLicense,
};

//! ---
//! lic_section: "02-entitlement-engine"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Typed inputs of entitlement operations."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use chrono::{DateTime, Duration, SubsecRound, Utc};

/// Provision a license with a caller-chosen serial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateLicense {
    pub serial: String,
    pub key: String,
    pub product_id: String,
    pub number_of_seats: u32,
    pub expiration: Option<DateTime<Utc>>,
    pub email: Option<String>,
    pub comment: Option<String>,
    pub is_upgrade: bool,
    pub upgrade_from_key: Option<String>,
}

impl CreateLicense {
    /// Single-seat, perpetual, non-upgrade license.
    pub fn new(
        serial: impl Into<String>,
        key: impl Into<String>,
        product_id: impl Into<String>,
    ) -> Self {
        Self {
            serial: serial.into(),
            key: key.into(),
            product_id: product_id.into(),
            number_of_seats: 1,
            expiration: None,
            email: None,
            comment: None,
            is_upgrade: false,
            upgrade_from_key: None,
        }
    }
}

/// Provision a license with a generated serial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertLicense {
    pub key: String,
    pub product_id: String,
    pub active: bool,
    pub expiration: ExpirationPolicy,
}

/// Bind `key` for `product_id` to `entity_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRequest {
    pub key: String,
    pub product_id: String,
    pub entity_id: String,
    /// Previously held key, required when the license is an upgrade.
    pub precondition: Option<String>,
}

impl BindRequest {
    pub fn new(
        key: impl Into<String>,
        product_id: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            product_id: product_id.into(),
            entity_id: entity_id.into(),
            precondition: None,
        }
    }

    pub fn with_precondition(mut self, key: impl Into<String>) -> Self {
        self.precondition = Some(key.into());
        self
    }
}

/// One member of a release cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseRef {
    pub serial: String,
    pub product_id: String,
}

impl LicenseRef {
    pub fn new(serial: impl Into<String>, product_id: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            product_id: product_id.into(),
        }
    }
}

/// Unbind every referenced license from `entity_id`, or none of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRequest {
    pub licenses: Vec<LicenseRef>,
    pub entity_id: String,
}

/// Replacement values for an existing license.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateLicense {
    pub key: String,
    pub product_id: String,
    pub active: bool,
    pub expiration: ExpirationPolicy,
}

/// How an update or upsert sets the expiration. Resolved instants are whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpirationPolicy {
    /// Leave the current expiration untouched.
    Keep,
    /// Clear the expiration.
    Perpetual,
    /// Expire at the given instant.
    At(DateTime<Utc>),
    /// Expire one default term from now.
    #[default]
    DefaultTerm,
}

impl ExpirationPolicy {
    /// Resolve against the current expiration.
    pub fn resolve(
        &self,
        current: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        default_term: Duration,
    ) -> Option<DateTime<Utc>> {
        match self {
            ExpirationPolicy::Keep => current,
            ExpirationPolicy::Perpetual => None,
            ExpirationPolicy::At(at) => Some(at.trunc_subsecs(0)),
            ExpirationPolicy::DefaultTerm => Some((now + default_term).trunc_subsecs(0)),
        }
    }
}

//! ---
//! lic_section: "02-entitlement-engine"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Failure taxonomy of entitlement operations."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use licensor_store::StoreError;

/// Result alias used throughout the engine crate.
pub type Result<T> = std::result::Result<T, EntitlementError>;

/// Reasons an entitlement operation is refused or fails.
#[derive(Debug, thiserror::Error)]
pub enum EntitlementError {
    /// The requested state clashes with existing records.
    #[error("{0}")]
    Conflict(String),
    /// An upgrade license was bound without naming its previous key.
    #[error("{0}")]
    PreconditionRequired(String),
    /// The named previous key does not satisfy the upgrade.
    #[error("{0}")]
    PreconditionFailed(String),
    /// The request references nothing the caller may read.
    #[error("{0}")]
    BadRequest(String),
    /// Storage failed underneath the operation.
    #[error("license store failure: {0}")]
    Store(StoreError),
    /// Following `upgrade_from_key` links revisited a key or exceeded the hop limit.
    #[error("upgrade chain corrupted at key '{key}' after {hops} hops")]
    ChainCorrupted {
        /// Key at which the walk stopped.
        key: String,
        /// Ancestors resolved before stopping.
        hops: usize,
    },
}

impl EntitlementError {
    /// Stable label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            EntitlementError::Conflict(_) => "conflict",
            EntitlementError::PreconditionRequired(_) => "precondition_required",
            EntitlementError::PreconditionFailed(_) => "precondition_failed",
            EntitlementError::BadRequest(_) => "bad_request",
            EntitlementError::Store(_) => "store",
            EntitlementError::ChainCorrupted { .. } => "chain_corrupted",
        }
    }

    /// Whether the failure is a fault of the service rather than of the request.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            EntitlementError::Store(_) | EntitlementError::ChainCorrupted { .. }
        )
    }
}

impl From<StoreError> for EntitlementError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { field, value } => EntitlementError::Conflict(format!(
                "The license {field} '{value}' already exists."
            )),
            other => EntitlementError::Store(other),
        }
    }
}

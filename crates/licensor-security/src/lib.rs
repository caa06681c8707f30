//! ---
//! lic_section: "03-access-gateway"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Authentication, authorization and audit for the license service."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Access gateway in front of the entitlement engine: Basic credentials,
//! HS256 bearer tokens, role policy and a tamper-evident audit trail.

pub mod audit;
pub mod credentials;
pub mod gateway;
pub mod metrics;
pub mod policy;
pub mod token;

pub use audit::{AuditEntry, AuditLog};
pub use credentials::Credentials;
pub use gateway::{AccessGateway, AuthMethod, CredentialVerifier, Principal};
pub use metrics::GatewayMetrics;
pub use policy::{AccessPolicy, Permission, Role, AUDITOR_ROLE, ISSUER_ROLE};
pub use token::{IssuedToken, TokenClaims, TokenService};

/// Result alias used throughout the security crate.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Reasons a request is not let through to the engine.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No `Authorization` header was supplied.
    #[error("Full authentication is required to access this resource")]
    MissingCredentials,
    /// The `Authorization` header could not be parsed.
    #[error("malformed authorization header: {0}")]
    MalformedCredentials(String),
    /// Username or secret did not match.
    #[error("Bad credentials")]
    InvalidCredentials,
    /// A bearer token failed signature or claim validation.
    #[error("invalid bearer token: {0}")]
    InvalidToken(String),
    /// A bearer token is past its expiry.
    #[error("bearer token expired")]
    TokenExpired,
    /// The principal holds no role granting the permission.
    #[error("access denied: {permission:?} required")]
    Forbidden {
        /// Permission the request needed.
        permission: Permission,
    },
    /// A principal carries a role the policy does not define.
    #[error("role not found: {0}")]
    UnknownRole(String),
    /// Signing a token failed.
    #[error("token signing failed: {0}")]
    Signing(String),
}

impl GatewayError {
    /// Whether the caller failed to prove who they are (as opposed to being refused).
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            GatewayError::MissingCredentials
                | GatewayError::MalformedCredentials(_)
                | GatewayError::InvalidCredentials
                | GatewayError::InvalidToken(_)
                | GatewayError::TokenExpired
        )
    }
}

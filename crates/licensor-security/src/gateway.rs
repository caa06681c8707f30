//! ---
//! lic_section: "03-access-gateway"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Request authentication and authorization."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use licensor_engine::{EntitlementEngine, IssuerIdentity};
use serde::Serialize;
use tracing::{debug, warn};

use crate::credentials::{strip_scheme, Credentials};
use crate::metrics::GatewayMetrics;
use crate::policy::{AccessPolicy, Permission, ISSUER_ROLE};
use crate::token::{IssuedToken, TokenService};
use crate::{GatewayError, Result};

/// Checks a username and secret against the account allowed to use the service.
pub trait CredentialVerifier: Send + Sync {
    /// Whether the pair identifies the account.
    fn verify(&self, username: &str, secret: &str) -> bool;
}

impl CredentialVerifier for EntitlementEngine {
    fn verify(&self, username: &str, secret: &str) -> bool {
        self.check_issuer_credentials(username, secret)
    }
}

impl CredentialVerifier for IssuerIdentity {
    fn verify(&self, username: &str, secret: &str) -> bool {
        self.check_credentials(username, secret)
    }
}

/// How a principal proved its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// HTTP Basic credentials.
    Basic,
    /// Bearer token from the login endpoint.
    Bearer,
}

impl AuthMethod {
    fn label(self) -> &'static str {
        match self {
            AuthMethod::Basic => "basic",
            AuthMethod::Bearer => "bearer",
        }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Account name.
    pub username: String,
    /// Granted role names.
    pub roles: Vec<String>,
    /// Scheme used to authenticate.
    pub method: AuthMethod,
}

/// Authenticates requests and applies the role policy.
pub struct AccessGateway {
    verifier: Arc<dyn CredentialVerifier>,
    tokens: TokenService,
    policy: AccessPolicy,
    metrics: Option<GatewayMetrics>,
}

impl AccessGateway {
    /// Gateway checking Basic credentials with `verifier` and bearer tokens with `tokens`.
    pub fn new(
        verifier: Arc<dyn CredentialVerifier>,
        tokens: TokenService,
        policy: AccessPolicy,
    ) -> Self {
        Self {
            verifier,
            tokens,
            policy,
            metrics: None,
        }
    }

    /// Attach Prometheus instrumentation.
    pub fn with_metrics(mut self, metrics: GatewayMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Authenticate the value of an `Authorization` header.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<Principal> {
        let header = authorization.ok_or(GatewayError::MissingCredentials)?;
        let method = if strip_scheme(header, "Bearer").is_some() {
            AuthMethod::Bearer
        } else {
            AuthMethod::Basic
        };
        if let Some(metrics) = &self.metrics {
            metrics.inc_auth_attempt(method.label());
        }

        let result = match method {
            AuthMethod::Bearer => self.authenticate_bearer(header),
            AuthMethod::Basic => self.authenticate_basic(header),
        };
        if let Err(err) = &result {
            if let Some(metrics) = &self.metrics {
                metrics.inc_auth_failure(method.label());
            }
            debug!(method = method.label(), reason = %err, "authentication failed");
        }
        result
    }

    /// Refuse `principal` unless one of its roles grants `permission`.
    pub fn authorize(&self, principal: &Principal, permission: Permission) -> Result<()> {
        let granted = self
            .policy
            .is_authorized(&principal.roles, permission)
            .unwrap_or_else(|err| {
                warn!(username = %principal.username, error = %err, "principal carries unknown role");
                false
            });
        if granted {
            return Ok(());
        }
        if let Some(metrics) = &self.metrics {
            metrics.inc_access_denial(&format!("{permission:?}"));
        }
        warn!(username = %principal.username, permission = ?permission, "access denied");
        Err(GatewayError::Forbidden { permission })
    }

    /// Exchange issuer credentials for a bearer token.
    pub fn login(&self, username: &str, password: &str) -> Result<IssuedToken> {
        if let Some(metrics) = &self.metrics {
            metrics.inc_auth_attempt("login");
        }
        if !self.verifier.verify(username, password) {
            if let Some(metrics) = &self.metrics {
                metrics.inc_auth_failure("login");
            }
            return Err(GatewayError::InvalidCredentials);
        }
        self.tokens.issue(username, &[ISSUER_ROLE.to_owned()])
    }

    fn authenticate_basic(&self, header: &str) -> Result<Principal> {
        let credentials = Credentials::from_basic_header(header)?;
        if !self
            .verifier
            .verify(&credentials.username, &credentials.secret)
        {
            return Err(GatewayError::InvalidCredentials);
        }
        Ok(Principal {
            username: credentials.username,
            roles: vec![ISSUER_ROLE.to_owned()],
            method: AuthMethod::Basic,
        })
    }

    fn authenticate_bearer(&self, header: &str) -> Result<Principal> {
        let token = strip_scheme(header, "Bearer")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| GatewayError::MalformedCredentials("empty bearer token".into()))?;
        let claims = self.tokens.verify(token)?;
        Ok(Principal {
            username: claims.sub,
            roles: claims.roles,
            method: AuthMethod::Bearer,
        })
    }
}

impl fmt::Debug for AccessGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessGateway")
            .field("tokens", &self.tokens)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use prometheus::Registry;

    use super::*;
    use crate::policy::AUDITOR_ROLE;

    fn gateway() -> AccessGateway {
        let issuer = IssuerIdentity::new("vendor", "s3cret", "Vendor", "https://support.example");
        AccessGateway::new(
            Arc::new(issuer),
            TokenService::new(b"0123456789abcdef0123456789abcdef", Duration::from_secs(600)),
            AccessPolicy::new(),
        )
    }

    fn basic(username: &str, secret: &str) -> String {
        Credentials {
            username: username.into(),
            secret: secret.into(),
        }
        .to_basic_header()
    }

    #[test]
    fn basic_credentials_grant_issuer_role() {
        let principal = gateway()
            .authenticate(Some(&basic("vendor", "s3cret")))
            .unwrap();
        assert_eq!(principal.username, "vendor");
        assert_eq!(principal.roles, vec![ISSUER_ROLE]);
        assert_eq!(principal.method, AuthMethod::Basic);
    }

    #[test]
    fn wrong_secret_and_missing_header_are_unauthenticated() {
        let gateway = gateway();
        let wrong = gateway
            .authenticate(Some(&basic("vendor", "nope")))
            .unwrap_err();
        assert!(matches!(wrong, GatewayError::InvalidCredentials));
        let missing = gateway.authenticate(None).unwrap_err();
        assert!(missing.is_unauthenticated());
    }

    #[test]
    fn login_token_authenticates_as_bearer() {
        let gateway = gateway();
        let issued = gateway.login("vendor", "s3cret").unwrap();
        let header = format!("Bearer {}", issued.token);
        let principal = gateway.authenticate(Some(&header)).unwrap();
        assert_eq!(principal.method, AuthMethod::Bearer);
        assert_eq!(principal.username, "vendor");

        assert!(matches!(
            gateway.login("vendor", "wrong"),
            Err(GatewayError::InvalidCredentials)
        ));
        assert!(matches!(
            gateway.authenticate(Some("Bearer ")),
            Err(GatewayError::MalformedCredentials(_))
        ));
    }

    #[test]
    fn auditor_is_refused_mutations_and_denial_is_counted() {
        let registry = Arc::new(Registry::new());
        let gateway = gateway().with_metrics(GatewayMetrics::new(registry.clone()).unwrap());
        let auditor = Principal {
            username: "ops".into(),
            roles: vec![AUDITOR_ROLE.into()],
            method: AuthMethod::Bearer,
        };
        gateway
            .authorize(&auditor, Permission::ReadLicenses)
            .unwrap();
        let err = gateway
            .authorize(&auditor, Permission::ManageLicenses)
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Forbidden {
                permission: Permission::ManageLicenses
            }
        ));
        assert!(!err.is_unauthenticated());

        let denials = registry
            .gather()
            .into_iter()
            .find(|family| family.get_name() == "licensor_gateway_access_denials_total")
            .unwrap();
        assert_eq!(denials.get_metric()[0].get_counter().get_value(), 1.0);
    }

    #[test]
    fn unknown_role_is_denied() {
        let stranger = Principal {
            username: "x".into(),
            roles: vec!["ghost".into()],
            method: AuthMethod::Bearer,
        };
        assert!(gateway()
            .authorize(&stranger, Permission::ReadLicenses)
            .is_err());
    }
}

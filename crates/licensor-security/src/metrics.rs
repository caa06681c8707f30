//! ---
//! lic_section: "03-access-gateway"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Prometheus counters for the access gateway."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::sync::Arc;

use prometheus::{IntCounterVec, Opts, Registry};

/// Authentication and authorization counters exported via Prometheus.
#[derive(Clone)]
pub struct GatewayMetrics {
    auth_attempts_total: IntCounterVec,
    auth_failures_total: IntCounterVec,
    access_denials_total: IntCounterVec,
}

impl GatewayMetrics {
    /// Register metrics with the provided registry.
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let auth_attempts_total = IntCounterVec::new(
            Opts::new(
                "licensor_gateway_auth_attempts_total",
                "Authentication attempts by scheme",
            ),
            &["method"],
        )?;
        let auth_failures_total = IntCounterVec::new(
            Opts::new(
                "licensor_gateway_auth_failures_total",
                "Failed authentication attempts by scheme",
            ),
            &["method"],
        )?;
        let access_denials_total = IntCounterVec::new(
            Opts::new(
                "licensor_gateway_access_denials_total",
                "Authenticated requests refused by the role policy",
            ),
            &["permission"],
        )?;

        registry.register(Box::new(auth_attempts_total.clone()))?;
        registry.register(Box::new(auth_failures_total.clone()))?;
        registry.register(Box::new(access_denials_total.clone()))?;

        Ok(Self {
            auth_attempts_total,
            auth_failures_total,
            access_denials_total,
        })
    }

    /// Count an authentication attempt.
    pub fn inc_auth_attempt(&self, method: &str) {
        self.auth_attempts_total.with_label_values(&[method]).inc();
    }

    /// Count a failed authentication.
    pub fn inc_auth_failure(&self, method: &str) {
        self.auth_failures_total.with_label_values(&[method]).inc();
    }

    /// Count a policy denial.
    pub fn inc_access_denial(&self, permission: &str) {
        self.access_denials_total
            .with_label_values(&[permission])
            .inc();
    }
}

impl std::fmt::Debug for GatewayMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayMetrics").finish_non_exhaustive()
    }
}

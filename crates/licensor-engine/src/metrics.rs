//! ---
//! lic_section: "02-entitlement-engine"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Prometheus instrumentation for entitlement operations."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::sync::Arc;

use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry};

/// Metrics published by the entitlement engine.
#[derive(Clone)]
pub struct EngineMetrics {
    operations: IntCounterVec,
    chain_length: Histogram,
}

impl EngineMetrics {
    /// Register all engine metrics with the provided registry.
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let operations = IntCounterVec::new(
            Opts::new(
                "licensor_engine_operations_total",
                "Entitlement operations by operation name and outcome",
            ),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations.clone()))?;

        let chain_length = Histogram::with_opts(
            HistogramOpts::new(
                "licensor_engine_upgrade_chain_length",
                "Number of licenses returned by successful upgrade binds",
            )
            .buckets(vec![2.0, 3.0, 4.0, 6.0, 8.0, 16.0, 32.0, 64.0]),
        )?;
        registry.register(Box::new(chain_length.clone()))?;

        Ok(Self {
            operations,
            chain_length,
        })
    }

    pub fn record_operation(&self, operation: &str, outcome: &str) {
        self.operations
            .with_label_values(&[operation, outcome])
            .inc();
    }

    pub fn observe_chain_length(&self, length: usize) {
        self.chain_length.observe(length as f64);
    }

    #[cfg(test)]
    pub(crate) fn operation_count(&self, operation: &str, outcome: &str) -> u64 {
        self.operations
            .with_label_values(&[operation, outcome])
            .get()
    }
}

impl std::fmt::Debug for EngineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineMetrics").finish_non_exhaustive()
    }
}

//! ---
//! lic_section: "02-entitlement-engine"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Entitlement decisions over the license store."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use chrono::{Duration, SubsecRound};
use licensor_store::{now, LicenseRecord, LicenseStore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::chain::resolve_ancestors;
use crate::error::{EntitlementError, Result};
use crate::issuer::IssuerIdentity;
use crate::metrics::EngineMetrics;
use crate::requests::{
    BindRequest, CreateLicense, ReleaseRequest, UpdateLicense, UpsertLicense,
};

/// Default bound on upgrade chain length.
pub const DEFAULT_MAX_CHAIN_HOPS: usize = 64;
/// Default license term applied when an expiration is derived.
pub const DEFAULT_TERM_DAYS: i64 = 365;

/// Tunables of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePolicy {
    pub max_chain_hops: usize,
    pub default_term: Duration,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            max_chain_hops: DEFAULT_MAX_CHAIN_HOPS,
            default_term: Duration::days(DEFAULT_TERM_DAYS),
        }
    }
}

/// Decides creation, binding, upgrade and release of licenses.
///
/// The engine holds no state of its own between calls. Each operation runs in
/// exactly one store transaction and commits only when it succeeds, so a
/// refused operation never leaves a partial write behind.
pub struct EntitlementEngine {
    store: Arc<dyn LicenseStore>,
    issuer: IssuerIdentity,
    policy: EnginePolicy,
    metrics: Option<EngineMetrics>,
}

impl EntitlementEngine {
    pub fn new(store: Arc<dyn LicenseStore>, issuer: IssuerIdentity, policy: EnginePolicy) -> Self {
        Self {
            store,
            issuer,
            policy,
            metrics: None,
        }
    }

    /// Attach Prometheus instrumentation.
    pub fn with_metrics(mut self, metrics: EngineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn issuer(&self) -> &IssuerIdentity {
        &self.issuer
    }

    pub fn policy(&self) -> &EnginePolicy {
        &self.policy
    }

    /// Provision a license. Serial and key must both be unused.
    pub fn create(&self, request: CreateLicense) -> Result<LicenseRecord> {
        let result = self.create_record(request, true);
        self.observe("create", result)
    }

    /// Provision a license under a generated serial with one seat.
    pub fn upsert_create(&self, request: UpsertLicense) -> Result<LicenseRecord> {
        let expiration = request
            .expiration
            .resolve(None, now(), self.policy.default_term);
        let create = CreateLicense {
            expiration,
            ..CreateLicense::new(Uuid::new_v4().to_string(), request.key, request.product_id)
        };
        let result = self.create_record(create, request.active);
        self.observe("upsert_create", result)
    }

    /// Bind a license to an entity.
    ///
    /// Returns `[record]` for a plain license. For an upgrade it returns the
    /// precondition record, the bound record, then every ancestor reachable from
    /// the precondition, nearest first.
    pub fn bind(&self, request: &BindRequest) -> Result<Vec<LicenseRecord>> {
        let result = self.bind_records(request);
        if let (Ok(records), Some(metrics)) = (&result, &self.metrics) {
            if records.len() > 1 {
                metrics.observe_chain_length(records.len());
            }
        }
        self.observe("bind", result)
    }

    /// Unbind every referenced license from the entity. Either all references
    /// match a license bound to that entity or nothing changes.
    pub fn release(&self, request: &ReleaseRequest) -> Result<()> {
        let result = self.release_records(request);
        self.observe("release", result)
    }

    /// Look up a license by key within a product.
    pub fn get(&self, key: &str, product_id: &str) -> Result<LicenseRecord> {
        let result = self
            .store
            .begin()
            .map_err(EntitlementError::from)
            .and_then(|tx| Ok(tx.find_by_key_and_product(key, product_id)?))
            .and_then(|found| found.ok_or_else(invalid_key_request));
        self.observe("get", result)
    }

    /// Look up a license by serial.
    pub fn get_by_serial(&self, serial: &str) -> Result<LicenseRecord> {
        let result = self
            .store
            .begin()
            .map_err(EntitlementError::from)
            .and_then(|tx| Ok(tx.find_by_serial(serial)?))
            .and_then(|found| found.ok_or_else(invalid_key_request));
        self.observe("get_by_serial", result)
    }

    /// Replace key, product, enabled flag and expiration of the license held under `key`.
    pub fn update(&self, key: &str, request: UpdateLicense) -> Result<LicenseRecord> {
        let result = self.update_record(key, request);
        self.observe("update", result)
    }

    /// Delete an unbound license, returning its last state.
    pub fn erase(&self, key: &str) -> Result<LicenseRecord> {
        let result = self.erase_record(key);
        self.observe("erase", result)
    }

    /// Every stored license.
    pub fn dump(&self) -> Result<Vec<LicenseRecord>> {
        let result = self
            .store
            .begin()
            .and_then(|tx| tx.list_all())
            .map_err(EntitlementError::from);
        self.observe("dump", result)
    }

    pub fn count(&self) -> Result<u64> {
        let result = self
            .store
            .begin()
            .and_then(|tx| tx.count())
            .map_err(EntitlementError::from);
        self.observe("count", result)
    }

    /// Whether `username` / `secret` are the issuer's credentials.
    pub fn check_issuer_credentials(&self, username: &str, secret: &str) -> bool {
        let accepted = self.issuer.check_credentials(username, secret);
        if !accepted {
            warn!(username = %username, "issuer credential check failed");
        }
        accepted
    }

    fn create_record(&self, request: CreateLicense, enabled: bool) -> Result<LicenseRecord> {
        let mut tx = self.store.begin()?;
        if tx.find_by_serial(&request.serial)?.is_some() {
            return Err(EntitlementError::Conflict(format!(
                "The license id '{}' already exists.",
                request.serial
            )));
        }
        if tx.find_by_key(&request.key)?.is_some() {
            return Err(EntitlementError::Conflict(format!(
                "The license key '{}' already exists.",
                request.key
            )));
        }

        let mut record = LicenseRecord::new(request.serial, request.key, request.product_id);
        record.enabled = enabled;
        record.number_of_seats = request.number_of_seats;
        record.expiration = request.expiration.map(|at| at.trunc_subsecs(0));
        record.email = request.email;
        record.comment = request.comment;
        record.is_upgrade = request.is_upgrade;
        record.upgrade_from_key = request.upgrade_from_key;

        tx.save(&record)?;
        tx.commit()?;
        info!(serial = %record.serial, product_id = %record.product_id, "license created");
        Ok(record)
    }

    fn bind_records(&self, request: &BindRequest) -> Result<Vec<LicenseRecord>> {
        let mut tx = self.store.begin()?;
        let mut license = tx
            .find_by_key_and_product(&request.key, &request.product_id)?
            .ok_or_else(|| invalid_key(&request.key))?;

        if !license.enabled {
            return Err(EntitlementError::Conflict(format!(
                "The license key '{}' is disabled. Contact {}",
                request.key,
                self.issuer.contact()
            )));
        }
        if let Some(holder) = &license.bound_entity_id {
            if holder != &request.entity_id {
                return Err(EntitlementError::Conflict(format!(
                    "The license key '{}' is already validated by someone else.",
                    request.key
                )));
            }
        }

        if !license.is_upgrade {
            license.bound_entity_id = Some(request.entity_id.clone());
            license.touch();
            tx.save(&license)?;
            tx.commit()?;
            info!(
                serial = %license.serial,
                product_id = %license.product_id,
                entity_id = %request.entity_id,
                "license bound"
            );
            return Ok(vec![license]);
        }

        let precondition = request.precondition.as_deref().ok_or_else(|| {
            EntitlementError::PreconditionRequired("Previous license key required.".to_owned())
        })?;
        let previous = tx.find_by_key(precondition)?.ok_or_else(|| {
            EntitlementError::PreconditionFailed("Invalid upgrade key.".to_owned())
        })?;
        if let Some(pinned) = &license.upgrade_from_key {
            if pinned != precondition {
                return Err(EntitlementError::PreconditionFailed(
                    "License already upgraded using a different key.".to_owned(),
                ));
            }
        }
        if previous.is_upgrade && !previous.is_bound() {
            return Err(EntitlementError::PreconditionFailed(
                "Previous upgrade license is unassigned.".to_owned(),
            ));
        }

        let ancestors =
            resolve_ancestors(&*tx, &previous, &license.key, self.policy.max_chain_hops)?;

        license.bound_entity_id = Some(request.entity_id.clone());
        if license.upgrade_from_key.is_none() {
            license.upgrade_from_key = Some(precondition.to_owned());
        }
        license.touch();
        tx.save(&license)?;
        tx.commit()?;
        info!(
            serial = %license.serial,
            product_id = %license.product_id,
            entity_id = %request.entity_id,
            upgrade_from = %precondition,
            ancestors = ancestors.len(),
            "upgrade license bound"
        );

        let mut chain = Vec::with_capacity(ancestors.len() + 2);
        chain.push(previous);
        chain.push(license);
        chain.extend(ancestors);
        Ok(chain)
    }

    fn release_records(&self, request: &ReleaseRequest) -> Result<()> {
        let mut tx = self.store.begin()?;
        let mut matched = Vec::with_capacity(request.licenses.len());
        for reference in &request.licenses {
            let Some(record) = tx.find_by_serial(&reference.serial)? else {
                continue;
            };
            if record.product_id == reference.product_id && record.is_bound_to(&request.entity_id)
            {
                matched.push(record);
            }
        }

        if matched.len() != request.licenses.len() {
            debug!(
                entity_id = %request.entity_id,
                requested = request.licenses.len(),
                matched = matched.len(),
                "release cluster mismatch"
            );
            return Err(EntitlementError::Conflict(
                "Mismatch in license cluster.".to_owned(),
            ));
        }

        for record in &mut matched {
            record.bound_entity_id = None;
            record.touch();
        }
        tx.save_all(&matched)?;
        tx.commit()?;
        info!(
            entity_id = %request.entity_id,
            released = matched.len(),
            "license cluster released"
        );
        Ok(())
    }

    fn update_record(&self, key: &str, request: UpdateLicense) -> Result<LicenseRecord> {
        let mut tx = self.store.begin()?;
        let mut record = tx.find_by_key(key)?.ok_or_else(|| invalid_key(key))?;
        if request.key != key && tx.find_by_key(&request.key)?.is_some() {
            return Err(EntitlementError::Conflict(format!(
                "The license key '{}' already exists.",
                request.key
            )));
        }

        record.expiration = request
            .expiration
            .resolve(record.expiration, now(), self.policy.default_term);
        record.key = request.key;
        record.product_id = request.product_id;
        record.enabled = request.active;
        record.touch();
        tx.save(&record)?;
        tx.commit()?;
        info!(serial = %record.serial, product_id = %record.product_id, enabled = record.enabled, "license updated");
        Ok(record)
    }

    fn erase_record(&self, key: &str) -> Result<LicenseRecord> {
        let mut tx = self.store.begin()?;
        let record = tx.find_by_key(key)?.ok_or_else(|| invalid_key(key))?;
        if record.is_in_use() {
            return Err(EntitlementError::Conflict(format!(
                "The license key '{key}' is in use. Remove license first!"
            )));
        }
        tx.delete(&record)?;
        tx.commit()?;
        info!(serial = %record.serial, product_id = %record.product_id, "license erased");
        Ok(record)
    }

    fn observe<T>(&self, operation: &'static str, result: Result<T>) -> Result<T> {
        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.kind(),
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_operation(operation, outcome);
        }
        if let Err(err) = &result {
            if err.is_internal() {
                error!(operation, error = %err, "entitlement operation failed");
            } else {
                debug!(operation, outcome, reason = %err, "entitlement operation refused");
            }
        }
        result
    }
}

impl fmt::Debug for EntitlementEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitlementEngine")
            .field("store", &self.store)
            .field("issuer", &self.issuer)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn invalid_key(key: &str) -> EntitlementError {
    EntitlementError::Conflict(format!("The license key '{key}' is not valid."))
}

fn invalid_key_request() -> EntitlementError {
    EntitlementError::BadRequest("The license key is not valid".to_owned())
}

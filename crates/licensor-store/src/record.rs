//! ---
//! lic_section: "01-license-store"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Persisted license record and timestamp helpers."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Current instant at the millisecond precision every backend can store.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Convert epoch seconds into a UTC instant, `None` when out of range.
pub fn from_epoch_seconds(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
}

/// Epoch seconds of an instant, as exchanged on the wire.
pub fn epoch_seconds(instant: &DateTime<Utc>) -> i64 {
    instant.timestamp()
}

/// A provisioned license key and its binding state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    /// Primary identifier, immutable after creation.
    pub serial: String,
    /// Opaque license key, unique across records.
    pub key: String,
    /// Product (audience) the key activates.
    pub product_id: String,
    /// Entity currently holding the binding.
    #[serde(default)]
    pub bound_entity_id: Option<String>,
    /// Vendor kill-switch.
    pub enabled: bool,
    /// Informational seat capacity.
    pub number_of_seats: u32,
    /// Absent means perpetual.
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    /// Whether binding requires a previously held license.
    #[serde(default)]
    pub is_upgrade: bool,
    /// Key of the license this one upgrades from. Pinned on first upgrade bind.
    #[serde(default)]
    pub upgrade_from_key: Option<String>,
    /// Bumped by every mutating operation.
    pub last_modified: DateTime<Utc>,
    /// Contact captured at creation.
    #[serde(default)]
    pub email: Option<String>,
    /// Free-form note captured at creation.
    #[serde(default)]
    pub comment: Option<String>,
}

impl LicenseRecord {
    /// Construct an enabled, unbound, single-seat, perpetual record.
    pub fn new(
        serial: impl Into<String>,
        key: impl Into<String>,
        product_id: impl Into<String>,
    ) -> Self {
        Self {
            serial: serial.into(),
            key: key.into(),
            product_id: product_id.into(),
            bound_entity_id: None,
            enabled: true,
            number_of_seats: 1,
            expiration: None,
            is_upgrade: false,
            upgrade_from_key: None,
            last_modified: now(),
            email: None,
            comment: None,
        }
    }

    /// Whether any entity currently holds the binding.
    pub fn is_bound(&self) -> bool {
        self.bound_entity_id.is_some()
    }

    /// Whether the binding is held by `entity_id`.
    pub fn is_bound_to(&self, entity_id: &str) -> bool {
        self.bound_entity_id.as_deref() == Some(entity_id)
    }

    /// A bound record is in use and cannot be erased.
    pub fn is_in_use(&self) -> bool {
        self.is_bound()
    }

    /// Whether the expiration lies at or before `at`. Perpetual records never expire.
    pub fn is_expired(&self, at: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|expiration| expiration <= at)
    }

    /// Record a mutation.
    pub fn touch(&mut self) {
        self.last_modified = now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_record_is_enabled_unbound_and_perpetual() {
        let record = LicenseRecord::new("SERIAL-1", "KEY-1", "product");
        assert!(record.enabled);
        assert!(!record.is_bound());
        assert!(!record.is_expired(Utc::now() + Duration::days(10_000)));
        assert_eq!(record.number_of_seats, 1);
    }

    #[test]
    fn binding_helpers_compare_entity() {
        let mut record = LicenseRecord::new("SERIAL-1", "KEY-1", "product");
        record.bound_entity_id = Some("device-a".into());
        assert!(record.is_in_use());
        assert!(record.is_bound_to("device-a"));
        assert!(!record.is_bound_to("device-b"));
    }

    #[test]
    fn expiry_is_inclusive() {
        let mut record = LicenseRecord::new("SERIAL-1", "KEY-1", "product");
        let at = from_epoch_seconds(1_700_000_000).unwrap();
        record.expiration = Some(at);
        assert!(record.is_expired(at));
        assert!(!record.is_expired(at - Duration::seconds(1)));
        assert_eq!(epoch_seconds(&at), 1_700_000_000);
    }

    #[test]
    fn now_has_millisecond_precision() {
        assert_eq!(now().timestamp_subsec_nanos() % 1_000_000, 0);
    }
}

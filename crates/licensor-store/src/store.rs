//! ---
//! lic_section: "01-license-store"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Store and transaction contracts shared by every backend."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::fmt;

use crate::record::LicenseRecord;
use crate::Result;

/// A backend holding license records.
pub trait LicenseStore: Send + Sync + fmt::Debug {
    /// Open a transaction. It holds the store's write lock until committed or dropped,
    /// so concurrent read-modify-write sequences are serialized.
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>>;

    /// Short backend name used in logs.
    fn backend_name(&self) -> &'static str;
}

/// Reads and writes performed inside one transaction.
///
/// Dropping a transaction without calling [`StoreTransaction::commit`] discards
/// every write it made.
pub trait StoreTransaction {
    /// Look up a record by its serial.
    fn find_by_serial(&self, serial: &str) -> Result<Option<LicenseRecord>>;

    /// Look up a record by its license key.
    fn find_by_key(&self, key: &str) -> Result<Option<LicenseRecord>>;

    /// Look up a record by key, requiring it to belong to `product_id`.
    fn find_by_key_and_product(&self, key: &str, product_id: &str)
        -> Result<Option<LicenseRecord>>;

    /// Insert or update by serial. Fails with `UniqueViolation` when another
    /// record already holds the key.
    fn save(&mut self, record: &LicenseRecord) -> Result<()>;

    /// Save a batch of records.
    fn save_all(&mut self, records: &[LicenseRecord]) -> Result<()> {
        for record in records {
            self.save(record)?;
        }
        Ok(())
    }

    /// Remove a record by its serial.
    fn delete(&mut self, record: &LicenseRecord) -> Result<()>;

    /// Every record, ordered by serial.
    fn list_all(&self) -> Result<Vec<LicenseRecord>>;

    /// Number of stored records.
    fn count(&self) -> Result<u64>;

    /// Make every write of this transaction durable and visible.
    fn commit(self: Box<Self>) -> Result<()>;
}

//! ---
//! lic_section: "01-license-store"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "In-memory license store with undo-log rollback."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::collections::{BTreeMap, HashMap};

use parking_lot::{Mutex, MutexGuard};
use tracing::trace;

use crate::record::LicenseRecord;
use crate::store::{LicenseStore, StoreTransaction};
use crate::{Result, StoreError};

#[derive(Debug, Default)]
struct Table {
    records: BTreeMap<String, LicenseRecord>,
    serial_by_key: HashMap<String, String>,
}

impl Table {
    fn by_key(&self, key: &str) -> Option<&LicenseRecord> {
        self.serial_by_key
            .get(key)
            .and_then(|serial| self.records.get(serial))
    }

    /// Returns the record previously stored under the same serial.
    fn put(&mut self, record: LicenseRecord) -> Result<Option<LicenseRecord>> {
        if let Some(holder) = self.serial_by_key.get(&record.key) {
            if holder != &record.serial {
                return Err(StoreError::UniqueViolation {
                    field: "key",
                    value: record.key,
                });
            }
        }
        let previous = self.records.insert(record.serial.clone(), record.clone());
        if let Some(previous) = &previous {
            if previous.key != record.key {
                self.serial_by_key.remove(&previous.key);
            }
        }
        self.serial_by_key.insert(record.key, record.serial);
        Ok(previous)
    }

    fn remove(&mut self, serial: &str) -> Option<LicenseRecord> {
        let removed = self.records.remove(serial)?;
        self.serial_by_key.remove(&removed.key);
        Some(removed)
    }

    fn restore(&mut self, serial: &str, previous: Option<LicenseRecord>) {
        self.remove(serial);
        if let Some(previous) = previous {
            self.serial_by_key
                .insert(previous.key.clone(), previous.serial.clone());
            self.records.insert(previous.serial.clone(), previous);
        }
    }
}

/// Process-local store used by tests and the `memory` backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: Mutex<Table>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `records`.
    pub fn with_records(records: impl IntoIterator<Item = LicenseRecord>) -> Result<Self> {
        let store = Self::new();
        {
            let mut table = store.table.lock();
            for record in records {
                table.put(record)?;
            }
        }
        Ok(store)
    }
}

impl LicenseStore for MemoryStore {
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>> {
        Ok(Box::new(MemoryTransaction {
            table: self.table.lock(),
            undo: Vec::new(),
            committed: false,
        }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryTransaction<'a> {
    table: MutexGuard<'a, Table>,
    /// Serial and prior state for every write, replayed in reverse on rollback.
    undo: Vec<(String, Option<LicenseRecord>)>,
    committed: bool,
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn find_by_serial(&self, serial: &str) -> Result<Option<LicenseRecord>> {
        Ok(self.table.records.get(serial).cloned())
    }

    fn find_by_key(&self, key: &str) -> Result<Option<LicenseRecord>> {
        Ok(self.table.by_key(key).cloned())
    }

    fn find_by_key_and_product(
        &self,
        key: &str,
        product_id: &str,
    ) -> Result<Option<LicenseRecord>> {
        Ok(self
            .table
            .by_key(key)
            .filter(|record| record.product_id == product_id)
            .cloned())
    }

    fn save(&mut self, record: &LicenseRecord) -> Result<()> {
        let previous = self.table.put(record.clone())?;
        self.undo.push((record.serial.clone(), previous));
        Ok(())
    }

    fn delete(&mut self, record: &LicenseRecord) -> Result<()> {
        let removed = self
            .table
            .remove(&record.serial)
            .ok_or_else(|| StoreError::NotFound {
                serial: record.serial.clone(),
            })?;
        self.undo.push((record.serial.clone(), Some(removed)));
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<LicenseRecord>> {
        Ok(self.table.records.values().cloned().collect())
    }

    fn count(&self) -> Result<u64> {
        Ok(self.table.records.len() as u64)
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.committed = true;
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if self.committed || self.undo.is_empty() {
            return;
        }
        trace!(writes = self.undo.len(), "rolling back memory transaction");
        while let Some((serial, previous)) = self.undo.pop() {
            self.table.restore(&serial, previous);
        }
    }
}

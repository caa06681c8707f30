//! ---
//! lic_section: "01-license-store"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "SQLite-backed license store."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{ffi, params, Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use crate::record::{from_epoch_seconds, LicenseRecord};
use crate::store::{LicenseStore, StoreTransaction};
use crate::{Result, StoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS licenses (
    serial           TEXT PRIMARY KEY NOT NULL,
    license_key      TEXT NOT NULL UNIQUE,
    product_id       TEXT NOT NULL,
    bound_entity_id  TEXT,
    enabled          INTEGER NOT NULL DEFAULT 1,
    number_of_seats  INTEGER NOT NULL DEFAULT 1,
    expiration       INTEGER,
    is_upgrade       INTEGER NOT NULL DEFAULT 0,
    upgrade_from_key TEXT,
    last_modified_ms INTEGER NOT NULL,
    email            TEXT,
    comment          TEXT
);
CREATE INDEX IF NOT EXISTS idx_licenses_key_product ON licenses (license_key, product_id);
";

const COLUMNS: &str = "serial, license_key, product_id, bound_entity_id, enabled, number_of_seats, \
    expiration, is_upgrade, upgrade_from_key, last_modified_ms, email, comment";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// License store persisted in a single SQLite database file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (creating when missing) the database at `path` and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn, Some(path.to_path_buf()))?;
        debug!(path = %path.display(), "opened sqlite license store");
        Ok(store)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl LicenseStore for SqliteStore {
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>> {
        let conn = self.conn.lock();
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Box::new(SqliteTransaction {
            conn,
            finished: false,
        }))
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

/// Column values as stored, before timestamp conversion.
struct RawRecord {
    serial: String,
    key: String,
    product_id: String,
    bound_entity_id: Option<String>,
    enabled: bool,
    number_of_seats: u32,
    expiration: Option<i64>,
    is_upgrade: bool,
    upgrade_from_key: Option<String>,
    last_modified_ms: i64,
    email: Option<String>,
    comment: Option<String>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            serial: row.get(0)?,
            key: row.get(1)?,
            product_id: row.get(2)?,
            bound_entity_id: row.get(3)?,
            enabled: row.get(4)?,
            number_of_seats: row.get(5)?,
            expiration: row.get(6)?,
            is_upgrade: row.get(7)?,
            upgrade_from_key: row.get(8)?,
            last_modified_ms: row.get(9)?,
            email: row.get(10)?,
            comment: row.get(11)?,
        })
    }

    fn into_record(self) -> Result<LicenseRecord> {
        let expiration = match self.expiration {
            Some(seconds) => Some(from_epoch_seconds(seconds).ok_or_else(|| {
                StoreError::Backend(format!(
                    "license '{}' has out-of-range expiration {seconds}",
                    self.serial
                ))
            })?),
            None => None,
        };
        let last_modified: DateTime<Utc> = DateTime::from_timestamp_millis(self.last_modified_ms)
            .ok_or_else(|| {
                StoreError::Backend(format!(
                    "license '{}' has out-of-range modification time {}",
                    self.serial, self.last_modified_ms
                ))
            })?;
        Ok(LicenseRecord {
            serial: self.serial,
            key: self.key,
            product_id: self.product_id,
            bound_entity_id: self.bound_entity_id,
            enabled: self.enabled,
            number_of_seats: self.number_of_seats,
            expiration,
            is_upgrade: self.is_upgrade,
            upgrade_from_key: self.upgrade_from_key,
            last_modified,
            email: self.email,
            comment: self.comment,
        })
    }
}

impl SqliteTransaction<'_> {
    fn query_one(&self, filter: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Option<LicenseRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM licenses WHERE {filter}");
        let raw = self
            .conn
            .query_row(&sql, args, RawRecord::from_row)
            .optional()?;
        raw.map(RawRecord::into_record).transpose()
    }
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn find_by_serial(&self, serial: &str) -> Result<Option<LicenseRecord>> {
        self.query_one("serial = ?1", &[&serial])
    }

    fn find_by_key(&self, key: &str) -> Result<Option<LicenseRecord>> {
        self.query_one("license_key = ?1", &[&key])
    }

    fn find_by_key_and_product(
        &self,
        key: &str,
        product_id: &str,
    ) -> Result<Option<LicenseRecord>> {
        self.query_one("license_key = ?1 AND product_id = ?2", &[&key, &product_id])
    }

    fn save(&mut self, record: &LicenseRecord) -> Result<()> {
        let outcome = self.conn.execute(
            "INSERT INTO licenses (serial, license_key, product_id, bound_entity_id, enabled, \
                 number_of_seats, expiration, is_upgrade, upgrade_from_key, last_modified_ms, email, comment)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(serial) DO UPDATE SET
                 license_key = excluded.license_key,
                 product_id = excluded.product_id,
                 bound_entity_id = excluded.bound_entity_id,
                 enabled = excluded.enabled,
                 number_of_seats = excluded.number_of_seats,
                 expiration = excluded.expiration,
                 is_upgrade = excluded.is_upgrade,
                 upgrade_from_key = excluded.upgrade_from_key,
                 last_modified_ms = excluded.last_modified_ms,
                 email = excluded.email,
                 comment = excluded.comment",
            params![
                record.serial,
                record.key,
                record.product_id,
                record.bound_entity_id,
                record.enabled,
                record.number_of_seats,
                record.expiration.map(|at| at.timestamp()),
                record.is_upgrade,
                record.upgrade_from_key,
                record.last_modified.timestamp_millis(),
                record.email,
                record.comment,
            ],
        );
        match outcome {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(failure, _))
                if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Err(StoreError::UniqueViolation {
                    field: "key",
                    value: record.key.clone(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    fn delete(&mut self, record: &LicenseRecord) -> Result<()> {
        let removed = self
            .conn
            .execute("DELETE FROM licenses WHERE serial = ?1", params![record.serial])?;
        if removed == 0 {
            return Err(StoreError::NotFound {
                serial: record.serial.clone(),
            });
        }
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<LicenseRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM licenses ORDER BY serial");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], RawRecord::from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }

    fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM licenses", [], |row| row.get(0))?;
        u64::try_from(count).map_err(|err| StoreError::Backend(err.to_string()))
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.conn.execute_batch("ROLLBACK") {
            warn!(error = %err, "failed to roll back sqlite transaction");
        }
    }
}

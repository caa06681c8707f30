//! ---
//! lic_section: "01-license-store"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Transactional storage of license records."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
//! License record storage.
//!
//! Every access goes through a [`StoreTransaction`] obtained from
//! [`LicenseStore::begin`]. Writes become visible on [`StoreTransaction::commit`];
//! a transaction dropped without committing rolls back.
#![warn(missing_docs)]

/// Result alias used throughout the store crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type for the storage subsystem.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A save would give two records the same unique column value.
    #[error("unique constraint violated on {field}: '{value}'")]
    UniqueViolation {
        /// Column carrying the uniqueness constraint.
        field: &'static str,
        /// Offending value.
        value: String,
    },
    /// Delete of a record that is not stored.
    #[error("no license record with serial '{serial}'")]
    NotFound {
        /// Serial that was requested.
        serial: String,
    },
    /// Failure reported by the storage backend.
    #[error("storage backend error: {0}")]
    Backend(String),
    /// Wrapper for IO errors encountered while reading/writing snapshot files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON serialization issues.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// Reported when a snapshot fails integrity verification.
    #[error("snapshot hash mismatch")]
    SnapshotHashMismatch,
    /// The snapshot envelope was written by an incompatible format version.
    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedSnapshotVersion {
        /// Version found in the file.
        found: u16,
        /// Version this build reads and writes.
        expected: u16,
    },
}

pub mod memory;
pub mod record;
pub mod snapshot;
pub mod sqlite;
pub mod store;

pub use memory::MemoryStore;
pub use record::{epoch_seconds, from_epoch_seconds, now, LicenseRecord};
pub use snapshot::{load_snapshot, save_snapshot};
pub use sqlite::SqliteStore;
pub use store::{LicenseStore, StoreTransaction};

//! ---
//! lic_section: "01-license-store"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Digest-protected JSON export and import of license records."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::record::LicenseRecord;
use crate::{Result, StoreError};

/// Envelope version written by [`save_snapshot`] and required by [`load_snapshot`].
const SNAPSHOT_VERSION: u16 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEnvelope {
    version: u16,
    created_at: DateTime<Utc>,
    hash: String,
    records: Vec<LicenseRecord>,
}

/// Write `records` to `path` inside a versioned envelope carrying their SHA-256 digest.
pub fn save_snapshot(records: &[LicenseRecord], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let envelope = SnapshotEnvelope {
        version: SNAPSHOT_VERSION,
        created_at: Utc::now(),
        hash: compute_hash(records)?,
        records: records.to_vec(),
    };

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &envelope)?;
    writer.flush()?;
    Ok(())
}

/// Read the records stored at `path`, rejecting other envelope versions and
/// snapshots whose digest does not match.
pub fn load_snapshot(path: &Path) -> Result<Vec<LicenseRecord>> {
    let bytes = fs::read(path)?;
    let envelope: SnapshotEnvelope = serde_json::from_slice(&bytes)?;
    if envelope.version != SNAPSHOT_VERSION {
        return Err(StoreError::UnsupportedSnapshotVersion {
            found: envelope.version,
            expected: SNAPSHOT_VERSION,
        });
    }
    if envelope.hash != compute_hash(&envelope.records)? {
        return Err(StoreError::SnapshotHashMismatch);
    }
    Ok(envelope.records)
}

fn compute_hash(records: &[LicenseRecord]) -> Result<String> {
    let serialized = serde_json::to_vec(records)?;
    Ok(hex::encode(Sha256::digest(serialized)))
}

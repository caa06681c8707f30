//! ---
//! lic_section: "03-access-gateway"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Hash-chained audit trail of license mutations."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// One audited license mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    /// When the mutation was accepted.
    pub timestamp: DateTime<Utc>,
    /// Authenticated username that requested it.
    pub actor: String,
    /// Operation name, e.g. `license.bind`.
    pub action: String,
    /// Serial or key the operation targeted.
    pub subject: String,
    /// Operation specific context.
    pub metadata: serde_json::Value,
    /// SHA-256 over this entry's fields and `previous_hash`.
    pub hash: String,
    /// Hash of the preceding entry, all zeros for the first.
    pub previous_hash: String,
}

impl AuditEntry {
    fn compute_hash(
        timestamp: DateTime<Utc>,
        actor: &str,
        action: &str,
        subject: &str,
        metadata: &serde_json::Value,
        previous_hash: &str,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(
            timestamp
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_be_bytes(),
        );
        for field in [actor, action, subject] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        hasher.update(metadata.to_string().as_bytes());
        hasher.update(previous_hash.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn expected_hash(&self, previous_hash: &str) -> String {
        Self::compute_hash(
            self.timestamp,
            &self.actor,
            &self.action,
            &self.subject,
            &self.metadata,
            previous_hash,
        )
    }
}

/// Append-only audit log stored as newline-delimited JSON.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
    last_hash: String,
}

impl AuditLog {
    /// Open the log at `path`, creating parent directories. Existing entries set the chain head.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let last_hash = read_entries(&path)?
            .last()
            .map(|entry| entry.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_owned());
        Ok(Self { path, last_hash })
    }

    /// File backing the log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry chained to the current head.
    pub fn record(
        &mut self,
        actor: &str,
        action: &str,
        subject: &str,
        metadata: serde_json::Value,
    ) -> Result<AuditEntry> {
        let timestamp = Utc::now();
        let hash = AuditEntry::compute_hash(
            timestamp,
            actor,
            action,
            subject,
            &metadata,
            &self.last_hash,
        );
        let entry = AuditEntry {
            timestamp,
            actor: actor.to_owned(),
            action: action.to_owned(),
            subject: subject.to_owned(),
            metadata,
            hash: hash.clone(),
            previous_hash: self.last_hash.clone(),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("unable to open audit log {}", self.path.display()))?;
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        file.write_all(&line)?;
        file.flush()?;
        self.last_hash = hash;
        Ok(entry)
    }

    /// All entries in append order.
    pub fn entries(&self) -> Result<Vec<AuditEntry>> {
        read_entries(&self.path)
    }

    /// Whether every entry's hash matches its contents and links to its predecessor.
    pub fn verify(&self) -> Result<bool> {
        let mut previous = GENESIS_HASH.to_owned();
        for entry in read_entries(&self.path)? {
            if entry.previous_hash != previous || entry.expected_hash(&previous) != entry.hash {
                return Ok(false);
            }
            previous = entry.hash;
        }
        Ok(true)
    }
}

fn read_entries(path: &Path) -> Result<Vec<AuditEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    for line in BufReader::new(File::open(path)?).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: AuditEntry = serde_json::from_str(&line)
            .with_context(|| format!("corrupt audit entry in {}", path.display()))?;
        entries.push(entry);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reopened_log_continues_the_chain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit/licenses.log");
        let mut log = AuditLog::open(&path).unwrap();
        let first = log
            .record("vendor", "license.create", "S1", serde_json::json!({"key": "K1"}))
            .unwrap();
        assert_eq!(first.previous_hash, GENESIS_HASH);

        let mut reopened = AuditLog::open(&path).unwrap();
        let second = reopened
            .record("vendor", "license.erase", "K1", serde_json::Value::Null)
            .unwrap();
        assert_eq!(second.previous_hash, first.hash);
        assert_eq!(reopened.entries().unwrap().len(), 2);
        assert!(reopened.verify().unwrap());
    }

    #[test]
    fn edited_entry_breaks_verification() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let mut log = AuditLog::open(&path).unwrap();
        log.record("vendor", "license.bind", "K1", serde_json::json!({"entity": "E1"}))
            .unwrap();
        log.record("vendor", "license.release", "S1", serde_json::json!({"entity": "E1"}))
            .unwrap();
        assert!(log.verify().unwrap());

        let contents = fs::read_to_string(&path).unwrap();
        let tampered: Vec<String> = contents
            .lines()
            .map(|line| {
                let mut value: serde_json::Value = serde_json::from_str(line).unwrap();
                if value["action"] == "license.bind" {
                    value["metadata"]["entity"] = serde_json::json!("E2");
                }
                value.to_string()
            })
            .collect();
        fs::write(&path, tampered.join("\n")).unwrap();

        assert!(!AuditLog::open(&path).unwrap().verify().unwrap());
    }
}

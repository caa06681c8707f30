//! ---
//! lic_section: "02-entitlement-engine"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Upgrade chain resolution."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::collections::HashSet;

use licensor_store::{LicenseRecord, StoreTransaction};
use tracing::debug;

use crate::error::{EntitlementError, Result};

/// Follow `upgrade_from_key` links starting at `start`, returning the ancestors in chain
/// order (nearest first). `start` itself is not included.
///
/// `origin_key` is the key of the license being bound; reaching it again, revisiting any
/// key, or resolving more than `max_hops` ancestors is reported as
/// [`EntitlementError::ChainCorrupted`]. A link to a key with no record ends the walk.
pub fn resolve_ancestors(
    tx: &dyn StoreTransaction,
    start: &LicenseRecord,
    origin_key: &str,
    max_hops: usize,
) -> Result<Vec<LicenseRecord>> {
    let mut visited: HashSet<String> = HashSet::from([origin_key.to_owned(), start.key.clone()]);
    let mut ancestors = Vec::new();
    let mut next = start.upgrade_from_key.clone();

    while let Some(key) = next.take() {
        if ancestors.len() >= max_hops || !visited.insert(key.clone()) {
            return Err(EntitlementError::ChainCorrupted {
                key,
                hops: ancestors.len(),
            });
        }
        match tx.find_by_key(&key)? {
            Some(ancestor) => {
                next = ancestor.upgrade_from_key.clone();
                ancestors.push(ancestor);
            }
            None => {
                debug!(key = %key, "upgrade chain ends at unknown key");
            }
        }
    }

    Ok(ancestors)
}

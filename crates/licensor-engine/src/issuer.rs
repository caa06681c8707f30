//! ---
//! lic_section: "02-entitlement-engine"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Issuer identity and credential comparison."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const CREDENTIAL_CONTEXT: &[u8] = b"licensor-issuer-credential";

/// The vendor account that provisions licenses and is named in refusal messages.
#[derive(Clone)]
pub struct IssuerIdentity {
    id: String,
    secret: String,
    name: String,
    support_url: String,
}

impl IssuerIdentity {
    pub fn new(
        id: impl Into<String>,
        secret: impl Into<String>,
        name: impl Into<String>,
        support_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
            name: name.into(),
            support_url: support_url.into(),
        }
    }

    /// Issuer id, reported as `iss` on license views.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// `"<name> (<support url>)"`, appended to disabled-key refusals.
    pub fn contact(&self) -> String {
        format!("{} ({})", self.name, self.support_url)
    }

    /// Compare credentials with the configured account. The secret comparison
    /// runs in constant time over MAC tags of equal length.
    pub fn check_credentials(&self, username: &str, secret: &str) -> bool {
        let expected = match tag(self.secret.as_bytes()) {
            Some(tag) => tag,
            None => return false,
        };
        let mut candidate = match HmacSha256::new_from_slice(secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        candidate.update(CREDENTIAL_CONTEXT);
        let secret_matches = candidate.verify_slice(&expected).is_ok();
        secret_matches && username == self.id
    }
}

fn tag(secret: &[u8]) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(CREDENTIAL_CONTEXT);
    Some(mac.finalize().into_bytes().to_vec())
}

impl fmt::Debug for IssuerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuerIdentity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("support_url", &self.support_url)
            .finish_non_exhaustive()
    }
}

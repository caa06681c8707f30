//! ---
//! lic_section: "03-access-gateway"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "HTTP Basic credential parsing."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::fmt;

use base64::{engine::general_purpose, Engine as _};

use crate::{GatewayError, Result};

/// Username and secret presented by a caller.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account name.
    pub username: String,
    /// Secret in clear text, never logged.
    pub secret: String,
}

impl Credentials {
    /// Parse the value of an `Authorization: Basic <base64(user:secret)>` header.
    pub fn from_basic_header(value: &str) -> Result<Self> {
        let encoded = strip_scheme(value, "Basic")
            .ok_or_else(|| GatewayError::MalformedCredentials("expected Basic scheme".into()))?;
        let decoded = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|err| GatewayError::MalformedCredentials(err.to_string()))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| GatewayError::MalformedCredentials("credentials are not UTF-8".into()))?;
        let (username, secret) = decoded
            .split_once(':')
            .ok_or_else(|| GatewayError::MalformedCredentials("missing ':' separator".into()))?;
        Ok(Self {
            username: username.to_owned(),
            secret: secret.to_owned(),
        })
    }

    /// Encode as a Basic header value.
    pub fn to_basic_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.secret);
        format!("Basic {}", general_purpose::STANDARD.encode(raw))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Return the parameter of an authorization header using `scheme`, matched case-insensitively.
pub(crate) fn strip_scheme<'a>(value: &'a str, scheme: &str) -> Option<&'a str> {
    let (candidate, rest) = value.trim_start().split_once(' ')?;
    candidate.eq_ignore_ascii_case(scheme).then_some(rest)
}

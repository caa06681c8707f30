//! ---
//! lic_section: "05-runtime-common"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Build metadata reported by the Licensor binaries."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::fmt;

use serde::Serialize;

const PRODUCT: &str = "Licensor";
const UNKNOWN: &str = "unknown";

/// Package version plus what `build.rs` recorded through vergen.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: &'static str,
    pub built_at: &'static str,
    pub target: &'static str,
    /// `None` when the build script did not run.
    pub debug_build: Option<bool>,
}

impl VersionInfo {
    #[must_use]
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            built_at: option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or(UNKNOWN),
            target: option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or(UNKNOWN),
            debug_build: option_env!("VERGEN_CARGO_DEBUG").and_then(|flag| flag.parse().ok()),
        }
    }

    /// One-line form for log records, e.g. `Licensor v0.1.0`.
    #[must_use]
    pub fn banner(&self) -> String {
        format!("{PRODUCT} v{}", self.version)
    }

    /// Multi-line form printed by `-V`.
    #[must_use]
    pub fn extended(&self) -> String {
        let build = match self.debug_build {
            Some(true) => "debug",
            Some(false) => "release",
            None => UNKNOWN,
        };
        format!(
            "{}\nbuilt:  {}\ntarget: {}\nbuild:  {build}",
            self.banner(),
            self.built_at,
            self.target
        )
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.banner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_names_product_and_version() {
        let info = VersionInfo::current();
        assert_eq!(info.to_string(), format!("Licensor v{}", env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn extended_lists_build_metadata() {
        let info = VersionInfo {
            version: "1.2.3",
            built_at: "2026-01-01T00:00:00Z",
            target: "x86_64-unknown-linux-gnu",
            debug_build: Some(false),
        };
        let extended = info.extended();
        let lines: Vec<&str> = extended.lines().collect();
        assert_eq!(lines[0], "Licensor v1.2.3");
        assert_eq!(lines[3], "build:  release");
        assert!(lines[2].ends_with("x86_64-unknown-linux-gnu"));
    }
}

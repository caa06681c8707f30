//! ---
//! lic_section: "05-runtime-common"
//! lic_subsection: "tests"
//! lic_type: "test"
//! lic_scope: "code"
//! lic_description: "Configuration file discovery and validation."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

use licensor_common::config::{AppConfig, StoreBackend};
use licensor_common::LogFormat;
use tempfile::tempdir;

const FULL: &str = r#"
[issuer]
id = "cyberstrak"
secret = "issuer-secret"
name = "Cyberstrak"
support_url = "https://cyberstrak.example/support"

[store]
backend = "memory"

[api]
listen = "127.0.0.1:9090"
token_ttl = 600
token_secret = "0123456789abcdef0123456789abcdef"

[engine]
max_chain_hops = 8
default_term_days = 30

[logging]
directory = "var/log"
format = "pretty"

[metrics]
enabled = false

[audit]
path = "var/audit.log"
"#;

#[test]
fn first_existing_candidate_is_loaded() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("licensor.toml");
    fs::write(&path, FULL).unwrap();

    let loaded =
        AppConfig::load_with_source(&[dir.path().join("missing.toml"), path.clone()]).unwrap();
    assert_eq!(loaded.source, path);

    let config = loaded.config;
    assert_eq!(config.issuer.id, "cyberstrak");
    assert_eq!(config.store.backend, StoreBackend::Memory);
    assert_eq!(config.api.listen, "127.0.0.1:9090".parse::<SocketAddr>().unwrap());
    assert_eq!(config.api.token_ttl, Duration::from_secs(600));
    assert_eq!(config.engine.policy().max_chain_hops, 8);
    assert_eq!(config.engine.policy().default_term, chrono::Duration::days(30));
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert!(!config.metrics.enabled);
    assert!(config.audit.path.is_some());
}

#[test]
fn missing_candidates_are_reported() {
    let dir = tempdir().unwrap();
    let err = AppConfig::load_with_source(&[dir.path().join("nope.toml")]).unwrap_err();
    assert!(err.to_string().contains("no configuration files found"));
}

#[test]
fn invalid_values_are_rejected() {
    let cases = [
        ("[issuer]\nsecret = \"s\"\n", "issuer.id"),
        ("[issuer]\nid = \"v\"\nsecret = \"s\"\n[api]\ntoken_secret = \"short\"\n", "token_secret"),
        ("[issuer]\nid = \"v\"\nsecret = \"s\"\n[engine]\nmax_chain_hops = 0\n", "max_chain_hops"),
        ("[issuer]\nid = \"v\"\nsecret = \"s\"\n[store]\nbackend = \"sqlite\"\npath = \"\"\n", "store.path"),
    ];
    for (content, expected) in cases {
        let err = content.parse::<AppConfig>().unwrap_err();
        assert!(
            format!("{err:#}").contains(expected),
            "expected '{expected}' in '{err:#}'"
        );
    }
}

//! ---
//! lic_section: "07-testing"
//! lic_subsection: "integration-tests"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Upgrade and release scenarios end to end over HTTP and SQLite."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::path::Path;
use std::sync::Arc;

use licensor_api::{spawn_api_server, ApiServer, ApiState, LicenseView};
use licensor_common::config::AppConfig;
use licensor_common::{build_engine, open_store, VersionInfo};
use licensor_security::{AccessGateway, AccessPolicy, Credentials, TokenService};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

const PROD1: &str = "PROD1";

async fn start(dir: &Path) -> (ApiServer, String) {
    let config: AppConfig = format!(
        r#"
        [issuer]
        id = "vendor"
        secret = "vendor-secret"

        [store]
        backend = "sqlite"
        path = "{}"

        [api]
        listen = "127.0.0.1:0"
        token_secret = "scenario-token-secret-0123456789abcdef"
        "#,
        dir.join("licenses.db").display()
    )
    .parse()
    .unwrap();

    let store = open_store(&config.store).unwrap();
    let engine = Arc::new(build_engine(&config, store, None).unwrap());
    let secret = config.api.token_secret.clone().unwrap();
    let gateway = AccessGateway::new(
        engine.clone(),
        TokenService::new(secret.as_bytes(), config.api.token_ttl),
        AccessPolicy::new(),
    );
    let state = ApiState::new(engine, Arc::new(gateway), VersionInfo::current());
    let server = spawn_api_server(Arc::new(state), config.api.listen).unwrap();
    let base = format!("http://{}", server.addr());
    (server, base)
}

fn auth() -> String {
    Credentials {
        username: "vendor".into(),
        secret: "vendor-secret".into(),
    }
    .to_basic_header()
}

async fn post(client: &Client, url: String, body: Value) -> reqwest::Response {
    client
        .post(url)
        .header("Authorization", auth())
        .json(&body)
        .send()
        .await
        .unwrap()
}

async fn fetch(client: &Client, base: &str, key: &str) -> LicenseView {
    client
        .get(format!("{base}/get_license"))
        .query(&[("key", key), ("aud", PROD1)])
        .header("Authorization", auth())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn upgrade_then_release_cluster() {
    let dir = tempfile::tempdir().unwrap();
    let (server, base) = start(dir.path()).await;
    let client = Client::new();

    let created = post(
        &client,
        format!("{base}/create_license"),
        json!({
            "license": {"key": "KEY1", "aud": PROD1},
            "serial": "S1",
            "expiration": 1_900_000_000,
            "numberOfSeats": 1
        }),
    )
    .await;
    assert_eq!(created.status(), StatusCode::OK);

    let bound = post(
        &client,
        format!("{base}/add_license"),
        json!({"license": {"key": "KEY1", "aud": PROD1}, "entityId": "ENTITY1"}),
    )
    .await;
    assert_eq!(bound.status(), StatusCode::OK);
    assert_eq!(
        fetch(&client, &base, "KEY1").await.entity_id.as_deref(),
        Some("ENTITY1")
    );

    let upgrade = post(
        &client,
        format!("{base}/create_license"),
        json!({
            "license": {"key": "KEY2", "aud": PROD1},
            "serial": "S2",
            "expiration": 1_900_000_000,
            "numberOfSeats": 1,
            "isUpgrade": true,
            "upgradeFrom": "KEY1"
        }),
    )
    .await;
    assert_eq!(upgrade.status(), StatusCode::OK);

    let chain: Value = post(
        &client,
        format!("{base}/add_license"),
        json!({
            "license": {"key": "KEY2", "aud": PROD1},
            "entityId": "ENTITY1",
            "precondition": "KEY1"
        }),
    )
    .await
    .json()
    .await
    .unwrap();
    let keys: Vec<&str> = chain["licenses"]
        .as_array()
        .unwrap()
        .iter()
        .map(|license| license["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, ["KEY1", "KEY2"]);

    let cluster = json!({"licenses": [{"id": "S1", "aud": PROD1}]});
    let mismatch = post(
        &client,
        format!("{base}/remove_license"),
        json!({"licenseCluster": cluster, "entityId": "ENTITY2"}),
    )
    .await;
    assert_eq!(mismatch.status(), StatusCode::CONFLICT);
    let body: Value = mismatch.json().await.unwrap();
    assert_eq!(body["message"], "Mismatch in license cluster.");
    assert_eq!(
        fetch(&client, &base, "KEY1").await.entity_id.as_deref(),
        Some("ENTITY1")
    );

    let released = post(
        &client,
        format!("{base}/remove_license"),
        json!({"licenseCluster": cluster, "entityId": "ENTITY1"}),
    )
    .await;
    assert_eq!(released.status(), StatusCode::OK);
    assert_eq!(fetch(&client, &base, "KEY1").await.entity_id, None);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn disabled_license_names_issuer_contact() {
    let dir = tempfile::tempdir().unwrap();
    let (server, base) = start(dir.path()).await;
    let client = Client::new();

    let created = client
        .post(format!("{base}/api/licenses"))
        .header("Authorization", auth())
        .json(&json!({"key": "OFF", "aud": PROD1, "active": false}))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);

    let refused = post(
        &client,
        format!("{base}/add_license"),
        json!({"license": {"key": "OFF", "aud": PROD1}, "entityId": "ENTITY1"}),
    )
    .await;
    assert_eq!(refused.status(), StatusCode::CONFLICT);
    let body: Value = refused.json().await.unwrap();
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("disabled"), "{message}");
    assert!(message.contains("https://"), "{message}");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn records_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let client = Client::new();

    let (server, base) = start(dir.path()).await;
    for index in 0..3 {
        let response = post(
            &client,
            format!("{base}/create_license"),
            json!({
                "license": {"key": format!("K{index}"), "aud": PROD1},
                "serial": format!("S{index}"),
                "expiration": 1_900_000_000,
                "numberOfSeats": 1
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    server.shutdown().await.unwrap();

    let (server, base) = start(dir.path()).await;
    let dump: Vec<LicenseView> = client
        .get(format!("{base}/dump_licenses"))
        .header("Authorization", auth())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let serials: Vec<&str> = dump.iter().map(|view| view.id.as_str()).collect();
    assert_eq!(serials, ["S0", "S1", "S2"]);
    server.shutdown().await.unwrap();
}

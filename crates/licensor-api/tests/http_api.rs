//! ---
//! lic_section: "04-dispatch-api"
//! lic_subsection: "integration-tests"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "HTTP routes exercised over a live listener and in-process."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use licensor_api::{router, spawn_api_server, ApiState, ErrorBody, LicenseView};
use licensor_common::VersionInfo;
use licensor_engine::{EnginePolicy, EntitlementEngine, IssuerIdentity};
use licensor_security::{
    AccessGateway, AccessPolicy, AuditLog, Credentials, TokenService, AUDITOR_ROLE,
};
use licensor_store::MemoryStore;
use prometheus::Registry;
use serde_json::{json, Value};
use tower::ServiceExt;

const PRODUCT: &str = "3e200daa-6bf8-470b-bd6a-4f55996052c3";
const TOKEN_SECRET: &[u8] = b"http-test-token-secret-0123456789";

fn state(audit: Option<AuditLog>) -> Arc<ApiState> {
    let issuer = IssuerIdentity::new("vendor", "s3cret", "Cyberstrak", "https://cyberstrak.example");
    let engine = Arc::new(EntitlementEngine::new(
        Arc::new(MemoryStore::new()),
        issuer,
        EnginePolicy::default(),
    ));
    let gateway = Arc::new(AccessGateway::new(
        engine.clone(),
        TokenService::new(TOKEN_SECRET, Duration::from_secs(300)),
        AccessPolicy::new(),
    ));
    let mut state = ApiState::new(engine, gateway, VersionInfo::current())
        .with_registry(Arc::new(Registry::new()));
    if let Some(log) = audit {
        state = state.with_audit(log);
    }
    Arc::new(state)
}

fn basic() -> String {
    Credentials {
        username: "vendor".into(),
        secret: "s3cret".into(),
    }
    .to_basic_header()
}

fn create_body(serial: &str, key: &str) -> Value {
    json!({
        "license": {"key": key, "aud": PRODUCT, "email": "ops@example.com"},
        "serial": serial,
        "expiration": 1_900_000_000,
        "numberOfSeats": 2
    })
}

#[tokio::test]
async fn license_lifecycle_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.log");
    let server = spawn_api_server(
        state(Some(AuditLog::open(&audit_path).unwrap())),
        "127.0.0.1:0".parse().unwrap(),
    )
    .unwrap();
    let base = format!("http://{}", server.addr());
    let client = reqwest::Client::new();

    let greeting = client.get(&base).send().await.unwrap().text().await.unwrap();
    assert_eq!(greeting, "Hello World!");

    let created: LicenseView = client
        .post(format!("{base}/create_license"))
        .header("Authorization", basic())
        .json(&create_body("S1", "K1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(created.id, "S1");
    assert_eq!(created.iss, "vendor");
    assert_eq!(created.exp, Some(1_900_000_000));
    assert_eq!(created.number_of_seats, 2);

    let duplicate = client
        .post(format!("{base}/create_license"))
        .header("Authorization", basic())
        .json(&create_body("S1", "K-other"))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
    let body: ErrorBody = duplicate.json().await.unwrap();
    assert_eq!(body.status, 409);
    assert_eq!(body.error, "Conflict");
    assert_eq!(body.message, "The license id 'S1' already exists.");
    assert_eq!(body.path, "/create_license");

    let bound: Value = client
        .post(format!("{base}/add_license"))
        .header("Authorization", basic())
        .json(&json!({"license": {"key": "K1", "aud": PRODUCT}, "entityId": "ENTITY1"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(bound["licenses"][0]["key"], "K1");
    assert_eq!(bound["licenses"][0]["entityId"], "ENTITY1");

    let stolen = client
        .post(format!("{base}/add_license"))
        .header("Authorization", basic())
        .json(&json!({"license": {"key": "K1", "aud": PRODUCT}, "entityId": "ENTITY2"}))
        .send()
        .await
        .unwrap();
    assert_eq!(stolen.status(), StatusCode::CONFLICT);

    let blocked = client
        .post(format!("{base}/erase_license?key=K1"))
        .header("Authorization", basic())
        .send()
        .await
        .unwrap();
    assert_eq!(blocked.status(), StatusCode::CONFLICT);

    let released = client
        .post(format!("{base}/remove_license"))
        .header("Authorization", basic())
        .json(&json!({
            "licenseCluster": {"licenses": [bound["licenses"][0].clone()]},
            "entityId": "ENTITY1"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(released.status(), StatusCode::OK);

    let erased: LicenseView = client
        .post(format!("{base}/erase_license?key=K1"))
        .header("Authorization", basic())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(erased.id, "S1");

    let info = client
        .get(format!("{base}/info"))
        .header("Authorization", basic())
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(info, "License count: 0");

    server.shutdown().await.unwrap();

    let log = AuditLog::open(&audit_path).unwrap();
    let actions: Vec<String> = log
        .entries()
        .unwrap()
        .into_iter()
        .map(|entry| entry.action)
        .collect();
    assert_eq!(
        actions,
        ["license.create", "license.bind", "license.release", "license.erase"]
    );
    assert!(log.verify().unwrap());
}

#[tokio::test]
async fn upgrade_bind_maps_precondition_statuses() {
    let server = spawn_api_server(state(None), "127.0.0.1:0".parse().unwrap()).unwrap();
    let base = format!("http://{}", server.addr());
    let client = reqwest::Client::new();

    for body in [
        create_body("S1", "KEY1"),
        json!({
            "license": {"key": "KEY2", "aud": PRODUCT},
            "serial": "S2",
            "expiration": 1_900_000_000,
            "numberOfSeats": 1,
            "isUpgrade": true
        }),
    ] {
        let response = client
            .post(format!("{base}/create_license"))
            .header("Authorization", basic())
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let bind = |precondition: Option<&str>| {
        let mut body = json!({"license": {"key": "KEY2", "aud": PRODUCT}, "entityId": "ENTITY1"});
        if let Some(key) = precondition {
            body["precondition"] = json!(key);
        }
        client
            .post(format!("{base}/add_license"))
            .header("Authorization", basic())
            .json(&body)
            .send()
    };

    assert_eq!(
        bind(None).await.unwrap().status(),
        StatusCode::PRECONDITION_REQUIRED
    );
    assert_eq!(
        bind(Some("NOPE")).await.unwrap().status(),
        StatusCode::PRECONDITION_FAILED
    );

    let chain: Value = bind(Some("KEY1")).await.unwrap().json().await.unwrap();
    let keys: Vec<&str> = chain["licenses"]
        .as_array()
        .unwrap()
        .iter()
        .map(|license| license["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, ["KEY1", "KEY2"]);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn bearer_login_and_rest_resource_routes() {
    let app = router(state(None));

    let login = app
        .clone()
        .oneshot(
            Request::post("/api/auth/login")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({"username": "vendor", "password": "s3cret"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(login.status(), StatusCode::OK);
    let issued: Value = serde_json::from_slice(
        &axum::body::to_bytes(login.into_body(), usize::MAX)
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(issued["expiresInSeconds"], 300);
    let bearer = format!("Bearer {}", issued["token"].as_str().unwrap());

    let created = app
        .clone()
        .oneshot(
            Request::post("/api/licenses")
                .header("Authorization", &bearer)
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({"key": "K9", "aud": PRODUCT, "active": false}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let view: LicenseView = serde_json::from_slice(
        &axum::body::to_bytes(created.into_body(), usize::MAX)
            .await
            .unwrap(),
    )
    .unwrap();
    assert!(!view.enabled);
    assert!(view.exp.is_some());

    let fetched = app
        .clone()
        .oneshot(
            Request::get(format!("/api/licenses/{}", view.id))
                .header("Authorization", &bearer)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);

    let updated = app
        .clone()
        .oneshot(
            Request::put("/api/licenses/K9")
                .header("Authorization", &bearer)
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({"key": "K10", "aud": PRODUCT, "active": true, "expiration": 2_000_000_000})
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);

    let deleted = app
        .oneshot(
            Request::delete("/api/licenses/K10")
                .header("Authorization", &bearer)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::OK);
}

#[tokio::test]
async fn authentication_and_validation_failures() {
    let app = router(state(None));

    let anonymous = app
        .clone()
        .oneshot(Request::get("/dump_licenses").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    assert!(anonymous.headers().contains_key("www-authenticate"));

    let auditor_token = TokenService::new(TOKEN_SECRET, Duration::from_secs(60))
        .issue("ops", &[AUDITOR_ROLE.to_owned()])
        .unwrap();
    let forbidden = app
        .clone()
        .oneshot(
            Request::post("/erase_license?key=K1")
                .header("Authorization", format!("Bearer {}", auditor_token.token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let invalid = app
        .clone()
        .oneshot(
            Request::post("/create_license")
                .header("Authorization", basic())
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({
                        "license": {"key": "K1", "aud": PRODUCT},
                        "serial": "S1",
                        "expiration": 1_900_000_000,
                        "numberOfSeats": 0
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = serde_json::from_slice(
        &axum::body::to_bytes(invalid.into_body(), usize::MAX)
            .await
            .unwrap(),
    )
    .unwrap();
    assert!(body.message.contains("number_of_seats"));

    let missing_key = app
        .clone()
        .oneshot(
            Request::get(format!("/get_license?key=NOPE&aud={PRODUCT}"))
                .header("Authorization", basic())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing_key.status(), StatusCode::BAD_REQUEST);

    let unknown_route = app
        .oneshot(Request::get("/nowhere").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(unknown_route.status(), StatusCode::NOT_FOUND);
    let body: ErrorBody = serde_json::from_slice(
        &axum::body::to_bytes(unknown_route.into_body(), usize::MAX)
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(body.path, "/nowhere");
}

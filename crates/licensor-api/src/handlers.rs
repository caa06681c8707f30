//! ---
//! lic_section: "04-dispatch-api"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Route handlers translating HTTP calls to engine operations."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use licensor_engine::{BindRequest, EntitlementEngine, ReleaseRequest};
use licensor_security::{IssuedToken, Permission, Principal};
use licensor_store::LicenseRecord;
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use tracing::debug;

use crate::auth::authorize;
use crate::dto::{
    BindBody, BoundLicenses, CreateLicenseBody, EraseLicenseQuery, GetLicenseQuery, LicenseView,
    LoginBody, ReleaseBody, UpsertBody,
};
use crate::error::ApiError;
use crate::extract::{ValidJson, ValidQuery};
use crate::ApiState;

type ApiResult<T> = Result<T, ApiError>;

/// Run a blocking engine call off the async workers.
async fn with_engine<T, F>(state: &Arc<ApiState>, op: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&EntitlementEngine) -> licensor_engine::Result<T> + Send + 'static,
{
    let engine = Arc::clone(state.engine());
    tokio::task::spawn_blocking(move || op(&engine))
        .await
        .map_err(|err| ApiError::internal(format!("engine task failed: {err}")))?
        .map_err(ApiError::from)
}

fn view(state: &ApiState, record: &LicenseRecord) -> LicenseView {
    LicenseView::from_record(record, state.engine().issuer())
}

fn views(state: &ApiState, records: &[LicenseRecord]) -> Vec<LicenseView> {
    records.iter().map(|record| view(state, record)).collect()
}

pub async fn hello() -> &'static str {
    "Hello World!"
}

pub async fn login(
    State(state): State<Arc<ApiState>>,
    ValidJson(body): ValidJson<LoginBody>,
) -> ApiResult<Json<IssuedToken>> {
    let issued = state.gateway().login(&body.username, &body.password)?;
    debug!(username = %body.username, "bearer token issued");
    Ok(Json(issued))
}

pub async fn metrics(State(state): State<Arc<ApiState>>) -> ApiResult<impl IntoResponse> {
    let registry = state
        .registry()
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "metrics are disabled"))?;
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&registry.gather(), &mut buffer)
        .map_err(|err| ApiError::internal(format!("metrics encoding failed: {err}")))?;
    Ok(([(CONTENT_TYPE, encoder.format_type().to_owned())], buffer))
}

pub async fn info(
    State(state): State<Arc<ApiState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<String> {
    authorize(&state, &principal, Permission::ReadLicenses)?;
    let count = with_engine(&state, |engine| engine.count()).await?;
    Ok(format!("License count: {count}"))
}

pub async fn create_license(
    State(state): State<Arc<ApiState>>,
    Extension(principal): Extension<Principal>,
    ValidJson(body): ValidJson<CreateLicenseBody>,
) -> ApiResult<Json<LicenseView>> {
    authorize(&state, &principal, Permission::ManageLicenses)?;
    let request = body.into_request()?;
    let record = with_engine(&state, move |engine| engine.create(request)).await?;
    state.audit(
        &principal,
        "license.create",
        &record.serial,
        json!({"key": record.key, "aud": record.product_id}),
    )
    .await;
    Ok(Json(view(&state, &record)))
}

pub async fn add_license(
    State(state): State<Arc<ApiState>>,
    Extension(principal): Extension<Principal>,
    ValidJson(body): ValidJson<BindBody>,
) -> ApiResult<Json<BoundLicenses>> {
    authorize(&state, &principal, Permission::BindLicenses)?;
    let request = BindRequest::from(body);
    let metadata = json!({
        "aud": request.product_id,
        "entityId": request.entity_id,
        "precondition": request.precondition,
    });
    let key = request.key.clone();
    let records = with_engine(&state, move |engine| engine.bind(&request)).await?;
    state.audit(&principal, "license.bind", &key, metadata).await;
    Ok(Json(BoundLicenses {
        licenses: views(&state, &records),
    }))
}

pub async fn remove_license(
    State(state): State<Arc<ApiState>>,
    Extension(principal): Extension<Principal>,
    ValidJson(body): ValidJson<ReleaseBody>,
) -> ApiResult<StatusCode> {
    authorize(&state, &principal, Permission::BindLicenses)?;
    let request = ReleaseRequest::from(body);
    let serials: Vec<String> = request
        .licenses
        .iter()
        .map(|license| license.serial.clone())
        .collect();
    let entity_id = request.entity_id.clone();
    with_engine(&state, move |engine| engine.release(&request)).await?;
    state.audit(
        &principal,
        "license.release",
        &entity_id,
        json!({"serials": serials}),
    )
    .await;
    Ok(StatusCode::OK)
}

pub async fn get_license(
    State(state): State<Arc<ApiState>>,
    Extension(principal): Extension<Principal>,
    ValidQuery(query): ValidQuery<GetLicenseQuery>,
) -> ApiResult<Json<LicenseView>> {
    authorize(&state, &principal, Permission::ReadLicenses)?;
    let record = with_engine(&state, move |engine| engine.get(&query.key, &query.aud)).await?;
    Ok(Json(view(&state, &record)))
}

pub async fn erase_license(
    State(state): State<Arc<ApiState>>,
    Extension(principal): Extension<Principal>,
    ValidQuery(query): ValidQuery<EraseLicenseQuery>,
) -> ApiResult<Json<LicenseView>> {
    erase(&state, &principal, query.key).await.map(Json)
}

pub async fn dump_licenses(
    State(state): State<Arc<ApiState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<LicenseView>>> {
    authorize(&state, &principal, Permission::ReadLicenses)?;
    let records = with_engine(&state, |engine| engine.dump()).await?;
    Ok(Json(views(&state, &records)))
}

pub async fn upsert_license(
    State(state): State<Arc<ApiState>>,
    Extension(principal): Extension<Principal>,
    ValidJson(body): ValidJson<UpsertBody>,
) -> ApiResult<(StatusCode, Json<LicenseView>)> {
    authorize(&state, &principal, Permission::ManageLicenses)?;
    let upsert = body.into_upsert()?;
    let record = with_engine(&state, move |engine| engine.upsert_create(upsert)).await?;
    state.audit(
        &principal,
        "license.upsert",
        &record.serial,
        json!({"key": record.key, "aud": record.product_id, "active": record.enabled}),
    )
    .await;
    Ok((StatusCode::CREATED, Json(view(&state, &record))))
}

pub async fn get_license_by_serial(
    State(state): State<Arc<ApiState>>,
    Extension(principal): Extension<Principal>,
    Path(serial): Path<String>,
) -> ApiResult<Json<LicenseView>> {
    authorize(&state, &principal, Permission::ReadLicenses)?;
    let record = with_engine(&state, move |engine| engine.get_by_serial(&serial)).await?;
    Ok(Json(view(&state, &record)))
}

pub async fn update_license(
    State(state): State<Arc<ApiState>>,
    Extension(principal): Extension<Principal>,
    Path(key): Path<String>,
    ValidJson(body): ValidJson<UpsertBody>,
) -> ApiResult<Json<LicenseView>> {
    authorize(&state, &principal, Permission::ManageLicenses)?;
    let update = body.into_update()?;
    let previous_key = key.clone();
    let record = with_engine(&state, move |engine| engine.update(&key, update)).await?;
    state.audit(
        &principal,
        "license.update",
        &previous_key,
        json!({"key": record.key, "aud": record.product_id, "active": record.enabled}),
    )
    .await;
    Ok(Json(view(&state, &record)))
}

pub async fn delete_license(
    State(state): State<Arc<ApiState>>,
    Extension(principal): Extension<Principal>,
    Path(key): Path<String>,
) -> ApiResult<Json<LicenseView>> {
    erase(&state, &principal, key).await.map(Json)
}

async fn erase(state: &Arc<ApiState>, principal: &Principal, key: String) -> ApiResult<LicenseView> {
    authorize(state, principal, Permission::ManageLicenses)?;
    let record = with_engine(state, move |engine| engine.erase(&key)).await?;
    state.audit(
        principal,
        "license.erase",
        &record.key,
        json!({"serial": record.serial}),
    )
    .await;
    Ok(view(state, &record))
}

pub async fn not_found(method: Method, uri: Uri) -> ApiError {
    ApiError::new(
        StatusCode::NOT_FOUND,
        format!("No handler found for {method} {}", uri.path()),
    )
}

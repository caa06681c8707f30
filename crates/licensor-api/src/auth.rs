//! ---
//! lic_section: "04-dispatch-api"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Authentication middleware for protected routes."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use licensor_security::{GatewayError, Permission, Principal};

use crate::error::ApiError;
use crate::ApiState;

/// Resolve the caller from the `Authorization` header and attach the [`Principal`].
pub async fn require_auth(
    State(state): State<Arc<ApiState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .map(|value| {
            value.to_str().map_err(|_| {
                GatewayError::MalformedCredentials("authorization header is not ASCII".into())
            })
        })
        .transpose()?;
    let principal = state.gateway().authenticate(header)?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

pub(crate) fn authorize(
    state: &ApiState,
    principal: &Principal,
    permission: Permission,
) -> Result<(), ApiError> {
    state.gateway().authorize(principal, permission)?;
    Ok(())
}

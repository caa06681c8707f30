//! ---
//! lic_section: "04-dispatch-api"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Error to status mapping and the JSON error envelope."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use axum::extract::Request;
use axum::http::header::WWW_AUTHENTICATE;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use licensor_engine::EntitlementError;
use licensor_security::GatewayError;
use serde::{Deserialize, Serialize};
use tracing::error;
use validator::{ValidationErrors, ValidationErrorsKind};

const BASIC_CHALLENGE: &str = "Basic realm=\"licensor\"";

/// Failure returned by a handler, rendered as an [`ErrorBody`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<EntitlementError> for ApiError {
    fn from(err: EntitlementError) -> Self {
        let status = match &err {
            EntitlementError::Conflict(_) => StatusCode::CONFLICT,
            EntitlementError::PreconditionRequired(_) => StatusCode::PRECONDITION_REQUIRED,
            EntitlementError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            EntitlementError::BadRequest(_) => StatusCode::BAD_REQUEST,
            EntitlementError::Store(_) | EntitlementError::ChainCorrupted { .. } => {
                error!(error = %err, kind = err.kind(), "license operation failed internally");
                return Self::internal("Internal server error");
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        if err.is_unauthenticated() {
            return Self::new(StatusCode::UNAUTHORIZED, err.to_string());
        }
        match err {
            GatewayError::Forbidden { .. } | GatewayError::UnknownRole(_) => {
                Self::new(StatusCode::FORBIDDEN, "Access Denied")
            }
            other => {
                error!(error = %other, "gateway failure");
                Self::internal("Internal server error")
            }
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages = Vec::new();
        flatten_validation(None, &errors, &mut messages);
        messages.sort();
        Self::bad_request(messages.join("; "))
    }
}

fn flatten_validation(prefix: Option<&str>, errors: &ValidationErrors, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{field}"),
            None => field.to_string(),
        };
        match kind {
            ValidationErrorsKind::Field(failures) => {
                for failure in failures {
                    let reason = failure
                        .message
                        .as_ref()
                        .map(|message| message.to_string())
                        .unwrap_or_else(|| format!("is invalid ({})", failure.code));
                    out.push(format!("{path} {reason}"));
                }
            }
            ValidationErrorsKind::Struct(inner) => flatten_validation(Some(&path), inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    flatten_validation(Some(&format!("{path}[{index}]")), inner, out);
                }
            }
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub timestamp: String,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
}

impl ErrorBody {
    fn new(status: StatusCode, message: String, path: String) -> Self {
        let reason = status.canonical_reason().unwrap_or("Error").to_owned();
        let message = if message.trim().is_empty() {
            reason.clone()
        } else {
            message
        };
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            status: status.as_u16(),
            error: reason,
            message,
            path,
        }
    }
}

/// Message carried from [`ApiError`] to [`error_envelope`].
#[derive(Debug, Clone)]
struct ErrorDetails(String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody::new(self.status, self.message.clone(), String::new());
        let mut response = (self.status, Json(body)).into_response();
        response.extensions_mut().insert(ErrorDetails(self.message));
        if self.status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static(BASIC_CHALLENGE));
        }
        response
    }
}

/// Rewrite every error response into an [`ErrorBody`] naming the request path.
pub async fn error_envelope(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_owned();
    let response = next.run(request).await;
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    let message = response
        .extensions()
        .get::<ErrorDetails>()
        .map(|details| details.0.clone())
        .unwrap_or_default();
    let mut envelope = (status, Json(ErrorBody::new(status, message, path))).into_response();
    for (name, value) in response.headers() {
        if name == WWW_AUTHENTICATE || name == axum::http::header::ALLOW {
            envelope.headers_mut().insert(name.clone(), value.clone());
        }
    }
    envelope
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;

/// Error taxonomy (spec.md §7). The State Machine and HTTP layer convert
/// `anyhow::Error` into one of these before a response is written; internal
/// code keeps using `anyhow::Result` the way the rest of the codebase does.
#[derive(Debug)]
pub enum DomainError {
    Validation(String),
    Conflict(String),
    NotFound,
    ProviderTransient(String),
    ProviderPermanent(String),
    Integrity(String),
    Unauthorized,
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainError::Validation(m) => write!(f, "validation error: {m}"),
            DomainError::Conflict(m) => write!(f, "conflict: {m}"),
            DomainError::NotFound => write!(f, "not found"),
            DomainError::ProviderTransient(m) => write!(f, "provider transient error: {m}"),
            DomainError::ProviderPermanent(m) => write!(f, "provider permanent error: {m}"),
            DomainError::Integrity(m) => write!(f, "integrity error: {m}"),
            DomainError::Unauthorized => write!(f, "unauthorized"),
        }
    }
}

impl std::error::Error for DomainError {}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for DomainError {
    fn into_response(self) -> Response {
        let (code, body) = match &self {
            DomainError::Validation(m) => (StatusCode::BAD_REQUEST, m.clone()),
            DomainError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            DomainError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            DomainError::ProviderTransient(m) => (StatusCode::BAD_GATEWAY, m.clone()),
            DomainError::ProviderPermanent(m) => (StatusCode::UNPROCESSABLE_ENTITY, m.clone()),
            DomainError::Integrity(_) => {
                tracing::error!("integrity error: {self}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
            DomainError::Unauthorized => {
                // webhook signature failures are 401 with no body per spec.md §7
                return StatusCode::UNAUTHORIZED.into_response();
            }
        };
        (code, axum::Json(ErrorBody { error: body })).into_response()
    }
}

/// Converts an opaque `anyhow::Error` from store/driver code into the right
/// response: a missing row becomes 404, anything else is a loudly-logged
/// 500, since unrecognized integrity failures must never recover silently.
pub fn internal(err: anyhow::Error) -> DomainError {
    if err.is::<storefront_db::NotFoundError>() {
        return DomainError::NotFound;
    }
    tracing::error!("unhandled internal error: {err:#}");
    DomainError::Integrity(err.to_string())
}

//! API error handling: maps the crate-wide `Error` taxonomy (spec §7) onto
//! HTTP status codes and a consistent JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::Error;

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { status, code: code.into(), message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse { code: self.code, message: self.message };
        (self.status, Json(body)).into_response()
    }
}

/// Taxonomy mapping (spec §7): storage and illegal-state errors are
/// reported, not raised, everywhere else in the core; here at the REST
/// boundary they still need a status code for the rare case they escape.
impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound { entity_type, id } => ApiError::not_found(format!("{entity_type} '{id}' not found")),
            Error::Validation(msg) => ApiError::bad_request(msg),
            Error::Configuration(msg) => ApiError::bad_request(msg),
            Error::IllegalState { entity, id, from, to } => {
                ApiError::conflict(format!("cannot transition {entity} {id} from {from} to {to}"))
            }
            Error::RateLimited { retry_after_secs } => {
                ApiError::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", format!("retry after {retry_after_secs}s"))
            }
            Error::DatabaseSqlx(e) => {
                tracing::error!(error = %e, "database error at API boundary");
                ApiError::internal("a storage error occurred")
            }
            Error::Database(msg) => {
                tracing::error!(error = %msg, "database error at API boundary");
                ApiError::internal("a storage error occurred")
            }
            other => {
                tracing::error!(error = %other, "unexpected error at API boundary");
                ApiError::internal("an unexpected error occurred")
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err: ApiError = Error::not_found("Job", "abc").into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn illegal_state_maps_to_409() {
        let err: ApiError =
            Error::illegal_state("Job", "abc", "completed", "generating_pages").into();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[test]
    fn rate_limited_maps_to_429() {
        let err: ApiError = Error::RateLimited { retry_after_secs: 30 }.into();
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
    }
}

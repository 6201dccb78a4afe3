//! HTTP-facing error taxonomy (§7). Internal module errors are typed
//! per-module (`CodecError`, `LiveStoreError`, `PersistError`, ...) and are
//! converted into an `HttpError` only at the HTTP boundary.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid bearer token")]
    InvalidToken,
    #[error("token expired")]
    TokenExpired,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited")]
    RateLimited,
    #[error("dependency unavailable: {0}")]
    Unavailable(String),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            HttpError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            HttpError::MissingToken => (StatusCode::UNAUTHORIZED, "missing_token"),
            HttpError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token"),
            HttpError::TokenExpired => (StatusCode::UNAUTHORIZED, "token_expired"),
            HttpError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            HttpError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            HttpError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            HttpError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        if let HttpError::Internal(err) = &self {
            tracing::error!(error = %err, "unhandled internal error");
        }
        let body = ErrorBody {
            error: self.to_string(),
            code,
        };
        (status, Json(body)).into_response()
    }
}

pub type HttpResult<T> = Result<T, HttpError>;

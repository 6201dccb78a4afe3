//! External bearer-token authentication (§6 `AUTH_ENDPOINT`).
//!
//! Unlike the teacher's local JWT verification in `auth.rs`, identity here
//! is decided by a separate service: a bearer token is forwarded to
//! `AUTH_ENDPOINT` and the device address it resolves to is cached per
//! `AUTH_CACHE_TTL` so the hot `POST /position` and WebSocket-subscribe
//! paths don't call out on every request.

use std::time::Duration;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use moka::future::Cache;
use serde::Deserialize;

use crate::error::HttpError;
use crate::model::device_address::DeviceAddress;
use crate::web::AppState;

#[derive(Debug, Clone, Deserialize)]
struct AuthResponse {
    device_address: DeviceAddress,
}

/// The device an inbound request has authenticated as.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedDevice {
    pub address: DeviceAddress,
}

pub fn build_cache(ttl: Duration) -> Cache<String, DeviceAddress> {
    Cache::builder()
        .time_to_live(ttl)
        .max_capacity(10_000)
        .build()
}

fn bearer_token(parts: &Parts) -> Result<&str, HttpError> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .ok_or(HttpError::MissingToken)
}

/// Resolves `token` to a device address, consulting the cache first and
/// falling back to `AUTH_ENDPOINT`. Shared by the `AuthenticatedDevice`
/// extractor and the WebSocket upgrade handler's optional `?token=`.
pub async fn resolve_token(state: &AppState, token: &str) -> Result<DeviceAddress, HttpError> {
    if let Some(address) = state.auth_cache.get(token).await {
        return Ok(address);
    }

    let endpoint = state
        .config
        .auth_endpoint
        .as_deref()
        .ok_or_else(|| HttpError::Unavailable("auth endpoint not configured".to_string()))?;

    let response = state
        .http_client
        .get(endpoint)
        .bearer_auth(token)
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .map_err(|err| {
            tracing::warn!(error = %err, "auth endpoint request failed");
            HttpError::Unavailable("auth endpoint unreachable".to_string())
        })?;

    match response.status() {
        status if status.is_success() => {
            let body: AuthResponse = response
                .json()
                .await
                .map_err(|_| HttpError::InvalidToken)?;
            state
                .auth_cache
                .insert(token.to_string(), body.device_address)
                .await;
            Ok(body.device_address)
        }
        axum::http::StatusCode::UNAUTHORIZED => Err(HttpError::InvalidToken),
        axum::http::StatusCode::FORBIDDEN => Err(HttpError::TokenExpired),
        _ => Err(HttpError::Unavailable("auth endpoint error".to_string())),
    }
}

impl FromRequestParts<AppState> for AuthenticatedDevice {
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let address = resolve_token(state, token).await?;
        Ok(AuthenticatedDevice { address })
    }
}

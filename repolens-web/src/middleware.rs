//! Request middleware
//!
//! API-key gate and fixed-window rate limiting keyed by client IP.

use crate::{error::ApiError, AppState};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::{IpAddr, SocketAddr};
use tracing::debug;

/// Client address for rate limiting.
///
/// Prefers the socket peer; a proxy-supplied `x-forwarded-for` is used as
/// a fallback when the listener runs behind one. Requests with neither
/// (handler unit tests) collapse onto loopback.
pub fn client_ip(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> IpAddr {
    if let Some(ConnectInfo(addr)) = connect_info {
        return addr.ip();
    }

    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

/// Flat shared-secret check: when `API_KEY` is configured every request
/// must present it as `x-api-key`.
pub async fn api_key_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = &state.config.api_key else {
        return Ok(next.run(request).await);
    };

    let presented = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok());

    match presented {
        Some(key) if key == expected => Ok(next.run(request).await),
        Some(_) => {
            debug!("Rejected request with invalid API key");
            Err(ApiError::unauthorized("Invalid API key"))
        }
        None => {
            debug!("Rejected request with missing API key");
            Err(ApiError::unauthorized("Missing x-api-key header"))
        }
    }
}

/// Global limiter over every API route.
pub async fn global_rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ip = client_ip(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
    );

    match state.global_limiter.check(ip).await {
        Ok(()) => Ok(next.run(request).await),
        Err(retry_after_ms) => Err(ApiError::rate_limited(
            "Too many requests, please slow down",
            retry_after_ms,
        )),
    }
}

/// Strict limiter on analysis intake only.
pub async fn strict_rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ip = client_ip(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
    );

    match state.strict_limiter.check(ip).await {
        Ok(()) => Ok(next.run(request).await),
        Err(retry_after_ms) => Err(ApiError::rate_limited(
            "Analysis submission limit reached",
            retry_after_ms,
        )),
    }
}

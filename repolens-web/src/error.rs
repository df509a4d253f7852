//! HTTP error mapping
//!
//! Wraps the domain error taxonomy into the boundary envelope
//! `{error, message, status_code, details?, timestamp}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use repolens_core::RepolensError;
use serde::Serialize;
use tracing::error;

/// The wire-level error envelope
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// An error ready to be serialized as a response
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    /// Map a domain error onto the HTTP taxonomy.
    ///
    /// Internal messages are redacted in production.
    pub fn from_domain(err: RepolensError, production: bool) -> Self {
        err.log();

        let (status, name) = match &err {
            RepolensError::Validation { .. } => (StatusCode::BAD_REQUEST, "ValidationError"),
            RepolensError::NotFound { .. } => (StatusCode::NOT_FOUND, "NotFoundError"),
            RepolensError::Unauthorized { .. } => (StatusCode::UNAUTHORIZED, "UnauthorizedError"),
            RepolensError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RateLimitError"),
            RepolensError::ServiceUnavailable { .. } | RepolensError::Queue { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "ServiceUnavailableError")
            }
            RepolensError::Conflict { .. } => (StatusCode::CONFLICT, "ConflictError"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError"),
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR && production {
            "An internal error occurred".to_string()
        } else {
            err.to_string()
        };

        let details = err.context().and_then(|ctx| {
            if ctx.recovery_suggestions.is_empty() {
                None
            } else {
                Some(serde_json::json!({
                    "suggestions": ctx.recovery_suggestions,
                }))
            }
        });

        Self {
            status,
            body: ErrorBody {
                error: name.to_string(),
                message,
                status_code: status.as_u16(),
                details,
                timestamp: Utc::now(),
            },
        }
    }

    pub fn unauthorized(message: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: ErrorBody {
                error: "UnauthorizedError".to_string(),
                message: message.to_string(),
                status_code: StatusCode::UNAUTHORIZED.as_u16(),
                details: None,
                timestamp: Utc::now(),
            },
        }
    }

    pub fn rate_limited(message: &str, retry_after_ms: u64) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: ErrorBody {
                error: "RateLimitError".to_string(),
                message: message.to_string(),
                status_code: StatusCode::TOO_MANY_REQUESTS.as_u16(),
                details: Some(serde_json::json!({ "retryAfterMs": retry_after_ms })),
                timestamp: Utc::now(),
            },
        }
    }

    pub fn validation(message: &str, field: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                error: "ValidationError".to_string(),
                message: message.to_string(),
                status_code: StatusCode::BAD_REQUEST.as_u16(),
                details: Some(serde_json::json!({ "field": field })),
                timestamp: Utc::now(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(status = %self.status, error = %self.body.message, "Request failed");
        }
        (self.status, Json(self.body)).into_response()
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use derive_more::derive::Display;
use serde_json::json;

use crate::auth::AuthError;

pub type AppResult<T> = Result<T, AppError>;
pub type AppJsonResult<T> = AppResult<Json<T>>;

#[derive(Debug, Display)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Upstream(UpstreamError),
    DbError(mongodb::error::Error),
    Internal(anyhow::Error),
}

impl std::error::Error for AppError {}

/// Failure from an outside provider (mail or generative model), classified
/// so callers get a stable machine-readable kind.
#[derive(Debug, Display)]
#[display("{kind}: {message}")]
pub struct UpstreamError {
    pub kind: UpstreamKind,
    pub message: String,
}

impl UpstreamError {
    pub fn new(kind: UpstreamKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamKind {
    QuotaExceeded,
    Auth,
    PermissionDenied,
    SafetyBlocked,
    DeadlineExceeded,
    Other,
}

impl UpstreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpstreamKind::QuotaExceeded => "quota_exceeded",
            UpstreamKind::Auth => "provider_auth",
            UpstreamKind::PermissionDenied => "permission_denied",
            UpstreamKind::SafetyBlocked => "safety_blocked",
            UpstreamKind::DeadlineExceeded => "deadline_exceeded",
            UpstreamKind::Other => "provider_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            UpstreamKind::QuotaExceeded => StatusCode::SERVICE_UNAVAILABLE,
            UpstreamKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<UpstreamError> for AppError {
    fn from(error: UpstreamError) -> Self {
        AppError::Upstream(error)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(error)
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(error: mongodb::error::Error) -> Self {
        AppError::DbError(error)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Internal(error.into())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        tracing::error!("Reqwest error: {:?}", error);
        if error.is_timeout() {
            AppError::Upstream(UpstreamError::new(
                UpstreamKind::DeadlineExceeded,
                error.to_string(),
            ))
        } else if error.is_connect() {
            AppError::Upstream(UpstreamError::new(UpstreamKind::Other, error.to_string()))
        } else {
            AppError::Internal(error.into())
        }
    }
}

impl From<AuthError> for AppError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::MissingCredentials => {
                AppError::Unauthorized("No token provided".to_string())
            }
            // A present-but-unverifiable token is forbidden, not unauthorized.
            AuthError::InvalidToken => AppError::Forbidden("Invalid or expired token".to_string()),
            AuthError::KeyFetch(msg) => AppError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

// This centralizes all different errors from our app in one place
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let err = match self {
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg })))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, Json(json!({ "error": msg }))),
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "error": msg })))
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, Json(json!({ "error": msg }))),
            AppError::Upstream(upstream) => (
                upstream.kind.status(),
                Json(json!({
                    "error": "Upstream provider error",
                    "kind": upstream.kind.as_str(),
                    "details": upstream.message,
                })),
            ),
            AppError::DbError(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Database error" })),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
            }
        };
        tracing::error!("Error: {:?}", err.1);

        err.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_kind_maps_to_gateway_statuses() {
        assert_eq!(
            UpstreamKind::QuotaExceeded.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            UpstreamKind::DeadlineExceeded.status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(UpstreamKind::SafetyBlocked.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(UpstreamKind::Other.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn missing_and_invalid_tokens_map_to_distinct_errors() {
        assert!(matches!(
            AppError::from(AuthError::MissingCredentials),
            AppError::Unauthorized(_)
        ));
        assert!(matches!(
            AppError::from(AuthError::InvalidToken),
            AppError::Forbidden(_)
        ));
    }

    #[test]
    fn upstream_error_displays_kind_and_message() {
        let err = UpstreamError::new(UpstreamKind::QuotaExceeded, "rate limit hit");
        assert_eq!(err.to_string(), "QuotaExceeded: rate limit hit");
    }
}

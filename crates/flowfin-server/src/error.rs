//! HTTP-facing errors.
//!
//! Bodies are intentionally terse: a rejected CSRF token never says whether
//! it was missing, unknown or expired.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use flowfin_security::SecurityError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid CSRF token")]
    InvalidCsrfToken,

    #[error("Could not issue token")]
    TokenIssuance(#[source] SecurityError),

    #[error("Not found")]
    NotFound,

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCsrfToken => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::TokenIssuance(_) | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCsrfToken => "invalid_csrf_token",
            Self::NotFound => "not_found",
            Self::TokenIssuance(_) | Self::Internal => "internal_error",
        }
    }
}

impl From<SecurityError> for ApiError {
    fn from(err: SecurityError) -> Self {
        match err {
            SecurityError::InvalidToken => Self::InvalidCsrfToken,
            other => Self::TokenIssuance(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::TokenIssuance(ref source) = self {
            if source.is_fatal() {
                tracing::error!(error = %source, "CSRF token issuance failed");
            } else {
                tracing::warn!(error = %source, "CSRF token issuance failed");
            }
        }
        let body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_token_maps_to_forbidden() {
        let err = ApiError::from(SecurityError::InvalidToken);
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.code(), "invalid_csrf_token");
        assert_eq!(err.to_string(), "Invalid CSRF token");
    }

    #[test]
    fn randomness_failure_maps_to_internal_error() {
        let err = ApiError::from(SecurityError::randomness_unavailable("no entropy"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // Source detail stays out of the client-facing message.
        assert!(!err.to_string().contains("entropy"));
    }

    #[test]
    fn expiry_overflow_maps_to_internal_error() {
        let err = ApiError::from(SecurityError::ExpiryOutOfRange {
            ttl: std::time::Duration::from_secs(u64::MAX),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "internal_error");
    }
}

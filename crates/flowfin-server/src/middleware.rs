use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::server::AppState;

// =============================================================================
// Security Headers
// =============================================================================

/// Applies the composed security header set to every response.
///
/// This must be the outermost layer so that fallback, rejection and
/// panic responses are covered as well. Existing values are replaced, so
/// each header appears exactly once.
pub async fn security_headers(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let mut res = next.run(req).await;
    state.security_headers.apply(res.headers_mut());
    res
}

// =============================================================================
// CSRF Protection
// =============================================================================

/// Rejects state-changing requests that do not carry a valid CSRF token.
///
/// The token is read from the configured request header. Safe methods and
/// exempt paths pass through untouched. Every failure produces the same
/// 403 response.
pub async fn csrf_protection(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if !is_state_changing(req.method()) || state.csrf_config.is_exempt(req.uri().path()) {
        return next.run(req).await;
    }

    let candidate = req
        .headers()
        .get(state.csrf_config.header_name.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let valid = state.csrf.validate(candidate.as_deref()).await;

    if valid {
        next.run(req).await
    } else {
        tracing::info!(
            method = %req.method(),
            path = %req.uri().path(),
            "Rejected request with invalid CSRF token"
        );
        ApiError::InvalidCsrfToken.into_response()
    }
}

fn is_state_changing(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

// =============================================================================
// Other Middleware
// =============================================================================

/// Request id carried in request extensions for downstream logging.
#[derive(Debug, Clone)]
pub struct RequestId(pub HeaderValue);

// Middleware that ensures each request has an X-Request-Id and mirrors it on the response
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let header_name = HeaderName::from_static("x-request-id");

    // If the incoming request already has a request-id, preserve it; otherwise generate one
    let req_id_value = req
        .headers()
        .get(&header_name)
        .cloned()
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok());

    if let Some(ref value) = req_id_value {
        req.extensions_mut().insert(RequestId(value.clone()));
    }

    let mut res = next.run(req).await;

    if let Some(value) = req_id_value {
        res.headers_mut().insert(header_name, value);
    }

    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_mutating_methods_require_token() {
        assert!(is_state_changing(&Method::POST));
        assert!(is_state_changing(&Method::PUT));
        assert!(is_state_changing(&Method::PATCH));
        assert!(is_state_changing(&Method::DELETE));
        assert!(!is_state_changing(&Method::GET));
        assert!(!is_state_changing(&Method::HEAD));
        assert!(!is_state_changing(&Method::OPTIONS));
    }
}

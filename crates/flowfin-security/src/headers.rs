//! Security response header composition.
//!
//! The header set is composed once from [`HeaderPolicyConfig`] and then
//! shared read-only by every request. Composition is pure: the same policy
//! and environment always produce the same set.

use axum::http::{HeaderMap, HeaderName, HeaderValue, header};

use crate::config::{CspDirectives, HeaderPolicyConfig};

/// Renders a Content-Security-Policy value.
///
/// Each non-empty directive group becomes `"<directive> <sources...>"`;
/// groups are joined with `"; "`.
///
/// # Example
///
/// ```
/// use flowfin_security::config::CspDirectives;
/// use flowfin_security::headers::render_csp;
///
/// let csp = render_csp(&CspDirectives::default());
/// assert!(csp.starts_with("default-src 'self'; script-src 'self'"));
/// ```
#[must_use]
pub fn render_csp(directives: &CspDirectives) -> String {
    directives
        .groups()
        .iter()
        .filter(|(_, sources)| !sources.is_empty())
        .map(|(name, sources)| format!("{name} {}", sources.join(" ")))
        .collect::<Vec<_>>()
        .join("; ")
}

/// The immutable set of hardening headers applied to every response.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    headers: HeaderMap,
}

impl SecurityHeaders {
    /// Composes the header set.
    ///
    /// The Content-Security-Policy header is only emitted when `production`
    /// is set; all other headers are emitted in every environment. Values
    /// that are not valid header values are skipped with a warning; run
    /// [`HeaderPolicyConfig`] validation at startup to reject them early.
    #[must_use]
    pub fn compose(policy: &HeaderPolicyConfig, production: bool) -> Self {
        let mut headers = HeaderMap::new();

        if production {
            insert(
                &mut headers,
                header::CONTENT_SECURITY_POLICY,
                &render_csp(&policy.content_security_policy),
            );
        }
        insert(
            &mut headers,
            header::STRICT_TRANSPORT_SECURITY,
            &policy.strict_transport_security,
        );
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        headers.insert(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        );
        insert(&mut headers, header::REFERRER_POLICY, &policy.referrer_policy);
        insert(
            &mut headers,
            HeaderName::from_static("permissions-policy"),
            &policy.permissions_policy,
        );

        Self { headers }
    }

    /// The composed headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Writes every header into `target`, replacing existing values.
    ///
    /// Applying the set more than once leaves `target` unchanged after the
    /// first application.
    pub fn apply(&self, target: &mut HeaderMap) {
        for (name, value) in &self.headers {
            target.insert(name.clone(), value.clone());
        }
    }
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(name, v);
        }
        Err(_) => {
            tracing::warn!(header = %name, "Skipping security header with invalid value");
        }
    }
}

//! Security module configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [security.csrf]
//! token_ttl = "1h"
//! sweep_interval = "5m"
//! cookie_name = "csrf-token"
//! header_name = "x-csrf-token"
//!
//! [security.headers.content_security_policy]
//! connect_src = ["'self'", "https://*.supabase.co", "wss://*.supabase.co"]
//! ```

use std::time::Duration;

use axum::http::{HeaderName, HeaderValue};
use cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};

use crate::headers::render_csp;

/// Minimum number of random bytes in a token (128 bits).
pub const MIN_TOKEN_BYTES: usize = 16;

/// Maximum number of random bytes in a token.
pub const MAX_TOKEN_BYTES: usize = 256;

/// Longest accepted token lifetime (one year).
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Root security configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// CSRF token lifecycle settings.
    pub csrf: CsrfConfig,

    /// Response header policy.
    pub headers: HeaderPolicyConfig,
}

impl SecurityConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.csrf.validate()?;
        self.headers.validate()
    }
}

/// CSRF token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// How long an issued token stays valid.
    #[serde(with = "humantime_serde")]
    pub token_ttl: Duration,

    /// Number of random bytes per token before hex encoding.
    pub token_bytes: usize,

    /// Interval of the background sweep. Zero disables it; expired
    /// tokens are then only removed when validation observes them.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Name of the cookie carrying the token back to the browser.
    pub cookie_name: String,

    /// Request header that state-changing requests must echo the token in.
    pub header_name: String,

    /// Path prefixes that skip CSRF validation.
    pub exempt_paths: Vec<String>,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            token_ttl: Duration::from_secs(3600),
            token_bytes: 32,
            sweep_interval: Duration::from_secs(300),
            cookie_name: "csrf-token".to_string(),
            header_name: "x-csrf-token".to_string(),
            exempt_paths: Vec::new(),
        }
    }
}

impl CsrfConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.token_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "security.csrf.token_ttl must be > 0".into(),
            ));
        }
        if self.token_ttl > MAX_TOKEN_TTL {
            return Err(ConfigError::InvalidValue(format!(
                "security.csrf.token_ttl must be <= {}s",
                MAX_TOKEN_TTL.as_secs()
            )));
        }
        if self.token_bytes < MIN_TOKEN_BYTES {
            return Err(ConfigError::InvalidValue(format!(
                "security.csrf.token_bytes must be >= {MIN_TOKEN_BYTES}"
            )));
        }
        if self.token_bytes > MAX_TOKEN_BYTES {
            return Err(ConfigError::InvalidValue(format!(
                "security.csrf.token_bytes must be <= {MAX_TOKEN_BYTES}"
            )));
        }
        if self.cookie_name.is_empty() {
            return Err(ConfigError::InvalidValue(
                "security.csrf.cookie_name must not be empty".into(),
            ));
        }
        if HeaderName::from_bytes(self.header_name.as_bytes()).is_err() {
            return Err(ConfigError::InvalidValue(format!(
                "security.csrf.header_name '{}' is not a valid header name",
                self.header_name
            )));
        }
        Ok(())
    }

    /// Returns `true` if `path` is exempt from CSRF validation.
    #[must_use]
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Builds the cookie that carries an issued token.
    ///
    /// The cookie is always HttpOnly with `SameSite=Strict`; `secure`
    /// should be set for production deployments served over TLS.
    #[must_use]
    pub fn build_cookie(&self, token: &str, secure: bool) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), token.to_string()))
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Strict)
            .path("/")
            .max_age(cookie::time::Duration::seconds(
                i64::try_from(self.token_ttl.as_secs()).unwrap_or(i64::MAX),
            ))
            .build()
    }
}

/// Content-Security-Policy directive groups.
///
/// Each field lists the sources for one directive. Directives with an
/// empty source list are omitted from the rendered policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CspDirectives {
    pub default_src: Vec<String>,
    pub script_src: Vec<String>,
    pub style_src: Vec<String>,
    pub img_src: Vec<String>,
    pub font_src: Vec<String>,
    pub connect_src: Vec<String>,
    pub frame_ancestors: Vec<String>,
    pub form_action: Vec<String>,
}

fn sources(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

impl Default for CspDirectives {
    fn default() -> Self {
        Self {
            default_src: sources(&["'self'"]),
            script_src: sources(&["'self'", "'unsafe-eval'", "'unsafe-inline'"]),
            style_src: sources(&["'self'", "'unsafe-inline'"]),
            img_src: sources(&["'self'", "data:", "blob:", "https:"]),
            font_src: sources(&["'self'", "data:"]),
            connect_src: sources(&["'self'", "https://*.supabase.co", "wss://*.supabase.co"]),
            frame_ancestors: sources(&["'none'"]),
            form_action: sources(&["'self'"]),
        }
    }
}

impl CspDirectives {
    /// Directive groups in rendering order.
    #[must_use]
    pub fn groups(&self) -> [(&'static str, &[String]); 8] {
        [
            ("default-src", self.default_src.as_slice()),
            ("script-src", self.script_src.as_slice()),
            ("style-src", self.style_src.as_slice()),
            ("img-src", self.img_src.as_slice()),
            ("font-src", self.font_src.as_slice()),
            ("connect-src", self.connect_src.as_slice()),
            ("frame-ancestors", self.frame_ancestors.as_slice()),
            ("form-action", self.form_action.as_slice()),
        ]
    }
}

/// Security response header policy.
///
/// `X-Frame-Options`, `X-Content-Type-Options` and `X-XSS-Protection` are
/// not configurable.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeaderPolicyConfig {
    pub content_security_policy: CspDirectives,
    pub strict_transport_security: String,
    pub referrer_policy: String,
    pub permissions_policy: String,
}

impl Default for HeaderPolicyConfig {
    fn default() -> Self {
        Self {
            content_security_policy: CspDirectives::default(),
            strict_transport_security: "max-age=63072000; includeSubDomains; preload".to_string(),
            referrer_policy: "strict-origin-when-cross-origin".to_string(),
            permissions_policy: "camera=(), microphone=(), geolocation=()".to_string(),
        }
    }
}

impl HeaderPolicyConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let fixed = [
            ("strict_transport_security", &self.strict_transport_security),
            ("referrer_policy", &self.referrer_policy),
            ("permissions_policy", &self.permissions_policy),
        ];
        for (field, value) in fixed {
            if HeaderValue::from_str(value).is_err() {
                return Err(ConfigError::InvalidValue(format!(
                    "security.headers.{field} is not a valid header value"
                )));
            }
        }
        for (directive, list) in self.content_security_policy.groups() {
            let malformed = |s: &String| {
                s.is_empty() || s.contains([';', ',']) || s.chars().any(char::is_whitespace)
            };
            if list.iter().any(malformed) {
                return Err(ConfigError::InvalidValue(format!(
                    "content security policy source for '{directive}' must be non-empty and free of ';', ',' or whitespace"
                )));
            }
        }
        if HeaderValue::from_str(&render_csp(&self.content_security_policy)).is_err() {
            return Err(ConfigError::InvalidValue(
                "security.headers.content_security_policy is not a valid header value".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration value is out of range or malformed.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

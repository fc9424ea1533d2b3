//! Request security primitives for FlowFin.
//!
//! - [`csrf`]: issuance, validation and sweeping of CSRF tokens
//! - [`headers`]: composition of the security response header set
//! - [`clock`]: injectable time sources
//! - [`config`]: configuration types with validation

pub mod clock;
pub mod config;
pub mod csrf;
pub mod error;
pub mod headers;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, CspDirectives, CsrfConfig, HeaderPolicyConfig, SecurityConfig};
pub use csrf::{CsrfService, CsrfToken, CsrfTokenStorage, InMemoryTokenStorage};
pub use error::{SecurityError, SecurityResult};
pub use headers::{SecurityHeaders, render_csp};

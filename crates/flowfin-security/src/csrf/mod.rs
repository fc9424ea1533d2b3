//! CSRF token lifecycle.
//!
//! Tokens are opaque random identifiers with an absolute expiry. They are
//! issued to a page, echoed back by the browser on state-changing requests
//! and checked before the request proceeds.
//!
//! - Issuance draws from the operating system CSPRNG. There is no fallback
//!   to a weaker source.
//! - Validation never distinguishes a missing, unknown, or expired token.
//! - A token stays valid for repeated checks until it expires.
//! - Expired records are removed when a check observes them and by
//!   [`CsrfService::sweep`].

mod storage;

pub use storage::{CsrfTokenStorage, InMemoryTokenStorage};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use rand::rngs::OsRng;
use time::OffsetDateTime;

use crate::clock::{Clock, SystemClock};
use crate::config::{CsrfConfig, MAX_TOKEN_BYTES, MIN_TOKEN_BYTES};
use crate::{SecurityError, SecurityResult};

/// An issued CSRF token.
///
/// `Debug` output is redacted so tokens do not end up in logs.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CsrfToken(String);

impl CsrfToken {
    /// The token value handed to the client.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the token, returning its value.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CsrfToken(..)")
    }
}

impl AsRef<str> for CsrfToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Issues, validates and sweeps CSRF tokens.
#[derive(Clone)]
pub struct CsrfService {
    storage: Arc<dyn CsrfTokenStorage>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    token_bytes: usize,
}

impl CsrfService {
    /// Creates a service over `storage` using the wall clock.
    #[must_use]
    pub fn new(storage: Arc<dyn CsrfTokenStorage>, config: &CsrfConfig) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock), config)
    }

    /// Creates a service with an explicit time source.
    #[must_use]
    pub fn with_clock(
        storage: Arc<dyn CsrfTokenStorage>,
        clock: Arc<dyn Clock>,
        config: &CsrfConfig,
    ) -> Self {
        Self {
            storage,
            clock,
            ttl: config.token_ttl,
            token_bytes: config.token_bytes.clamp(MIN_TOKEN_BYTES, MAX_TOKEN_BYTES),
        }
    }

    /// Creates a service backed by [`InMemoryTokenStorage`].
    #[must_use]
    pub fn in_memory(config: &CsrfConfig) -> Self {
        Self::new(Arc::new(InMemoryTokenStorage::new()), config)
    }

    /// Token validity window.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a new token valid until `now + ttl`.
    ///
    /// # Errors
    ///
    /// Returns `RandomnessUnavailable` if the OS random source fails,
    /// `ExpiryOutOfRange` if `now + ttl` is not a representable instant and
    /// `Storage` if the token cannot be recorded.
    pub async fn issue(&self) -> SecurityResult<CsrfToken> {
        let expires_at = self.expiry_from(self.clock.now())?;
        let token = generate_token(self.token_bytes)?;
        self.storage.insert(&token, expires_at).await?;
        tracing::debug!(expires_at = %expires_at, "CSRF token issued");
        Ok(CsrfToken(token))
    }

    fn expiry_from(&self, now: OffsetDateTime) -> SecurityResult<OffsetDateTime> {
        time::Duration::try_from(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add(ttl))
            .ok_or(SecurityError::ExpiryOutOfRange { ttl: self.ttl })
    }

    /// Checks a candidate token.
    ///
    /// Returns `false` for a missing or empty candidate, an unknown token,
    /// or an expired token; an expired record is deleted as a side effect.
    /// A valid record is left untouched. Storage failures are logged and
    /// reported as `false`.
    pub async fn validate(&self, candidate: Option<&str>) -> bool {
        let Some(candidate) = candidate.filter(|c| !c.is_empty()) else {
            return false;
        };

        match self.check(candidate).await {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!(error = %e, "CSRF token lookup failed");
                false
            }
        }
    }

    /// Like [`validate`](Self::validate) but reports failure as an error.
    ///
    /// # Errors
    ///
    /// Returns `SecurityError::InvalidToken` whenever `validate` would
    /// return `false`.
    pub async fn require(&self, candidate: Option<&str>) -> SecurityResult<()> {
        if self.validate(candidate).await {
            Ok(())
        } else {
            Err(SecurityError::InvalidToken)
        }
    }

    async fn check(&self, candidate: &str) -> SecurityResult<bool> {
        let Some(expires_at) = self.storage.expires_at(candidate).await? else {
            return Ok(false);
        };

        let now = self.clock.now();
        if storage::is_expired(expires_at, now) {
            self.storage.remove_if_expired(candidate, now).await?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Removes every expired record, returning how many were removed.
    ///
    /// Idempotent and independent of validation: it only deletes records
    /// that validation would already reject.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn sweep(&self) -> SecurityResult<usize> {
        let removed = self.storage.remove_expired(self.clock.now()).await?;
        if removed > 0 {
            tracing::debug!(removed, "Swept expired CSRF tokens");
        }
        Ok(removed)
    }

    /// Number of records currently held by the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn stored_tokens(&self) -> SecurityResult<usize> {
        self.storage.count().await
    }

    /// Expiry of a stored token, if a record exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn expires_at(&self, token: &str) -> SecurityResult<Option<OffsetDateTime>> {
        self.storage.expires_at(token).await
    }
}

/// Generates `len` random bytes from the OS and hex-encodes them.
fn generate_token(len: usize) -> SecurityResult<String> {
    let mut bytes = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| SecurityError::randomness_unavailable(e.to_string()))?;
    Ok(hex::encode(bytes))
}

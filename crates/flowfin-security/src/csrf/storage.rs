//! CSRF token storage.
//!
//! A token record is only an identifier and its absolute expiry. Records
//! are never updated after insertion.
//!
//! # Implementation Notes
//!
//! Implementations must tolerate concurrent insert, lookup and removal.
//! `remove_if_expired` must be conditional on the stored expiry so that a
//! concurrent check can never delete a record that is still live.

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;

use crate::SecurityResult;

/// Storage trait for issued CSRF tokens.
///
/// The in-process [`InMemoryTokenStorage`] is correct for a single server
/// process. Deployments running several processes need an implementation
/// backed by a shared store.
#[async_trait]
pub trait CsrfTokenStorage: Send + Sync {
    /// Records a newly issued token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be stored.
    async fn insert(&self, token: &str, expires_at: OffsetDateTime) -> SecurityResult<()>;

    /// Returns the expiry of `token`, or `None` if no record exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn expires_at(&self, token: &str) -> SecurityResult<Option<OffsetDateTime>>;

    /// Removes `token` if its record has expired as of `now`.
    ///
    /// Returns `true` if a record was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn remove_if_expired(&self, token: &str, now: OffsetDateTime) -> SecurityResult<bool>;

    /// Removes every record that has expired as of `now`.
    ///
    /// Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn remove_expired(&self, now: OffsetDateTime) -> SecurityResult<usize>;

    /// Number of records currently held, expired or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn count(&self) -> SecurityResult<usize>;
}

/// Returns `true` if a record expiring at `expires_at` is stale at `now`.
///
/// A record is still valid at exactly its expiry instant.
#[inline]
pub(crate) fn is_expired(expires_at: OffsetDateTime, now: OffsetDateTime) -> bool {
    now > expires_at
}

/// Process-local token storage backed by a concurrent hash map.
#[derive(Debug, Default)]
pub struct InMemoryTokenStorage {
    tokens: DashMap<String, OffsetDateTime>,
}

impl InMemoryTokenStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CsrfTokenStorage for InMemoryTokenStorage {
    async fn insert(&self, token: &str, expires_at: OffsetDateTime) -> SecurityResult<()> {
        self.tokens.insert(token.to_string(), expires_at);
        Ok(())
    }

    async fn expires_at(&self, token: &str) -> SecurityResult<Option<OffsetDateTime>> {
        Ok(self.tokens.get(token).map(|entry| *entry.value()))
    }

    async fn remove_if_expired(&self, token: &str, now: OffsetDateTime) -> SecurityResult<bool> {
        Ok(self
            .tokens
            .remove_if(token, |_, expires_at| is_expired(*expires_at, now))
            .is_some())
    }

    async fn remove_expired(&self, now: OffsetDateTime) -> SecurityResult<usize> {
        let mut removed = 0;
        self.tokens.retain(|_, expires_at| {
            let keep = !is_expired(*expires_at, now);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    async fn count(&self) -> SecurityResult<usize> {
        Ok(self.tokens.len())
    }
}

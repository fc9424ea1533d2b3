//! Security error types.
//!
//! Invalid-token conditions are deliberately collapsed into a single
//! variant: callers must not learn whether a token was missing, unknown
//! or expired.

/// Errors that can occur while issuing or checking CSRF tokens.
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    /// The presented token is missing, unknown, or expired.
    #[error("Invalid token")]
    InvalidToken,

    /// The operating system random source failed. Issuance is aborted.
    #[error("Randomness unavailable: {message}")]
    RandomnessUnavailable {
        /// Description of the underlying failure.
        message: String,
    },

    /// The configured lifetime pushes the expiry past the representable range.
    #[error("Token expiry out of range for ttl {ttl:?}")]
    ExpiryOutOfRange {
        /// The offending lifetime.
        ttl: std::time::Duration,
    },

    /// The token storage backend failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },
}

impl SecurityError {
    /// Creates a new `RandomnessUnavailable` error.
    #[must_use]
    pub fn randomness_unavailable(message: impl Into<String>) -> Self {
        Self::RandomnessUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Returns `true` if this error must abort the current operation
    /// rather than degrade to a rejected request.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::RandomnessUnavailable { .. } | Self::ExpiryOutOfRange { .. }
        )
    }
}

/// Result type for security operations.
pub type SecurityResult<T> = Result<T, SecurityError>;

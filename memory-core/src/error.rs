//! Error types for the shared memory service.

use uuid::Uuid;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error conditions raised by the retrieval engine and its collaborating stores.
///
/// Dedup-rejection and safeguard-suppression are deliberately *not* error
/// variants — they surface as tagged result variants instead
/// (see [`crate::types::StoreResult`] and [`crate::types::SkipReason`]).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Content failed a validation rule (empty, oversize, bad tag, unknown scope, malformed query).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A vector, full-text, or graph store operation failed.
    #[error("store error: {0}")]
    Store(String),

    /// The embedding backend failed or timed out.
    #[error("embedding error: {0}")]
    Embedding(#[from] anyhow::Error),

    /// A memory, entity, or session chunk id was not found.
    #[error("not found: {0}")]
    NotFound(Uuid),

    /// Import rejected a bundle whose embedding dimension does not match the store.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the store was configured with.
        expected: usize,
        /// Dimension found on the incoming vector.
        actual: usize,
    },

    /// `correct` would introduce a cycle in the supersedes chain.
    #[error("cycle in correction chain at {0}")]
    CorrectionCycle(Uuid),

    /// Serialization/deserialization of a stored record failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation did not complete before its deadline.
    #[error("operation timed out")]
    Timeout,

    /// Configuration value was invalid (mismatched embedding dims, bad weight, etc).
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Whether a caller may retry the operation with backoff.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Store(_) | Error::Embedding(_) | Error::Timeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_and_timeout_are_recoverable() {
        assert!(Error::Store("down".into()).is_recoverable());
        assert!(Error::Timeout.is_recoverable());
    }

    #[test]
    fn validation_is_not_recoverable() {
        assert!(!Error::Validation("empty content".into()).is_recoverable());
        assert!(!Error::Cancelled.is_recoverable());
    }

    #[test]
    fn dimension_mismatch_display() {
        let err = Error::DimensionMismatch {
            expected: 384,
            actual: 768,
        };
        assert!(err.to_string().contains("384"));
        assert!(err.to_string().contains("768"));
    }
}

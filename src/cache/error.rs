//! Cache error taxonomy
//!
//! One concrete error enum for the whole engine. Tier-level I/O problems are
//! recovered locally by the orchestrator and only recorded in metrics; the
//! variants here are the ones a caller can actually observe.

/// Errors surfaced by cache operations.
///
/// `TierUnavailable` and `Timeout` exist so tier adapters can report what
/// went wrong internally; the orchestrator converts them into misses and
/// never returns them from a read path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A single tier's I/O failed (connectivity, backend refusal).
    TierUnavailable(String),
    /// A tier call exceeded its configured timeout.
    Timeout,
    /// The caller-supplied fallback computation failed. Never cached.
    Compute(String),
    /// Invalid `CacheConfig`, fatal at construction time.
    InvalidConfiguration(String),
    /// A value could not be encoded for storage.
    Serialization(String),
    /// A stored payload could not be decoded back into the requested type.
    Deserialization(String),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::TierUnavailable(msg) => write!(f, "Tier unavailable: {}", msg),
            CacheError::Timeout => write!(f, "Tier operation timed out"),
            CacheError::Compute(msg) => write!(f, "Fallback computation failed: {}", msg),
            CacheError::InvalidConfiguration(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
            CacheError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            CacheError::Deserialization(msg) => write!(f, "Deserialization error: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {}

impl CacheError {
    /// True for errors the orchestrator recovers from by degrading to the
    /// next tier (or to the fallback computation).
    pub fn is_tier_error(&self) -> bool {
        matches!(self, CacheError::TierUnavailable(_) | CacheError::Timeout)
    }
}

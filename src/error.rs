//! Error types for the idempotency middleware

use thiserror::Error;

/// Result type alias for the idempotency middleware
pub type Result<T> = std::result::Result<T, Error>;

/// Idempotency middleware errors
#[derive(Error, Debug)]
pub enum Error {
    /// A row already exists for this key.
    ///
    /// Internal to the store — consumed by the handler while resolving a
    /// duplicate, never surfaced to the caller directly.
    #[error("item already exists for key: {0}")]
    ItemAlreadyExists(String),

    /// No row exists for this key.
    ///
    /// Internal to the store — consumed by the handler.
    #[error("item not found for key: {0}")]
    ItemNotFound(String),

    /// A live duplicate is already executing.
    ///
    /// Carries the other execution's lease expiry (unix milliseconds) so the
    /// caller can decide when to retry.
    #[error("invocation already in progress, lease expires at {0} (unix ms)")]
    AlreadyInProgress(u64),

    /// The recomputed payload-validation hash did not match the stored one.
    ///
    /// Indicates either a key collision (two semantically different payloads
    /// hashing to the same selector subtree) or tampering.
    #[error("payload validation failed: recomputed hash does not match stored hash")]
    PayloadValidationFailed,

    /// The configured selector produced no value and `raise_on_no_idempotency_key`
    /// is set.
    #[error("key extraction failed: selector `{0}` produced no value")]
    KeyExtractionFailed(String),

    /// An unexpected failure from the persistence backend (network, throttling,
    /// malformed row, ...).
    #[error("persistence layer error: {0}")]
    PersistenceLayerError(String),

    /// Invalid configuration, raised at construction time.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// The wrapped user function failed.
    ///
    /// By the time this is returned, the `INPROGRESS` row has already been
    /// deleted on a best-effort basis so the next retry is not blocked.
    #[error("user function failed: {0}")]
    HandlerFailed(#[source] anyhow::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Construct a [`Error::PersistenceLayerError`] from any error source.
    pub fn persistence(cause: impl std::fmt::Display) -> Self {
        Self::PersistenceLayerError(cause.to_string())
    }
}

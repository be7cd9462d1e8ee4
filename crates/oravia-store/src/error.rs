//! Error types for the store layer.
//!
//! Backend failures surface as [`StoreError`]. A transaction body may also
//! refuse to commit; [`TxError`] keeps that refusal separate from store
//! failures so callers can match on their own error type.

/// Errors that can occur in the store layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The record kept changing under the transaction until the retry budget
    /// ran out. Transient: the caller may retry later.
    #[error("transaction on {key} conflicted {attempts} times")]
    Conflict {
        /// Key the transaction targeted.
        key: String,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// Stored bookkeeping data could not be interpreted.
    #[error("corrupt entry at {key}: {reason}")]
    Corrupt {
        /// Key holding the bad data.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Outcome of a failed [`transact`](crate::Store::transact).
#[derive(Debug, thiserror::Error)]
pub enum TxError<E> {
    /// The transaction body rejected the change; nothing was written.
    #[error("transaction aborted: {0}")]
    Aborted(E),

    /// The store failed or the retry budget ran out.
    #[error(transparent)]
    Store(#[from] StoreError),
}

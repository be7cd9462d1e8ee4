//! The store contract shared by every backend.
//!
//! Records are JSON values under string keys. Each key carries a version
//! that changes on every write; [`Store::transact`] uses it for optimistic
//! concurrency. There are no cross-key transactions.

use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;

use crate::error::{StoreError, TxError};

/// Capacity of the change feed.
///
/// A subscriber that falls more than this many changes behind skips ahead
/// to the newest change.
pub const CHANGE_CAPACITY: usize = 256;

/// A write or delete observed on the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct Change {
    /// Key that changed.
    pub key: String,
    /// New JSON value, or `None` if the key was deleted.
    pub value: Option<serde_json::Value>,
}

impl Change {
    /// Decode the new value, `Ok(None)` for a deletion.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, StoreError> {
        self.value
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .map_err(StoreError::from)
    }
}

/// Changes to a single key, in commit order.
pub struct Subscription {
    key: String,
    rx: broadcast::Receiver<Change>,
}

impl Subscription {
    /// Watch `key` on a backend's change feed.
    pub const fn new(key: String, rx: broadcast::Receiver<Change>) -> Self {
        Self { key, rx }
    }

    /// The watched key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the next change to the watched key.
    ///
    /// Returns `None` once the backend has shut down.
    pub async fn next(&mut self) -> Option<Change> {
        loop {
            match self.rx.recv().await {
                Ok(change) if change.key == self.key => return Some(change),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(key = %self.key, skipped = n, "subscription lagged, skipping ahead");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Versioned key-value storage with optimistic transactions.
///
/// Implementations are cheap to clone and share one underlying connection
/// or map.
pub trait Store: Clone + Send + Sync + 'static {
    /// Read and decode the record at `key`.
    fn read<T>(&self, key: &str) -> impl Future<Output = Result<Option<T>, StoreError>> + Send
    where
        T: DeserializeOwned + Send;

    /// Subscribe to writes and deletes of `key`.
    fn subscribe(&self, key: &str) -> Subscription;

    /// Run `body` against the current record and commit its result if the
    /// record did not change in the meantime.
    ///
    /// `body` receives the current value (`None` if absent) and returns the
    /// value to write plus an output for the caller. On a version conflict
    /// the body runs again against the fresh value, up to the configured
    /// attempt budget, after which [`StoreError::Conflict`] is returned. An
    /// `Err` from the body aborts without writing.
    fn transact<T, O, E, F>(
        &self,
        key: &str,
        body: F,
    ) -> impl Future<Output = Result<O, TxError<E>>> + Send
    where
        T: Serialize + DeserializeOwned + Send,
        O: Send,
        E: Send,
        F: FnMut(Option<T>) -> Result<(T, O), E> + Send;

    /// Insert `record` as `{collection}:{id}` unless that key exists.
    ///
    /// Returns whether the record was inserted.
    fn append<T>(
        &self,
        collection: &str,
        id: &str,
        record: &T,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send
    where
        T: Serialize + Sync;

    /// Every record in `collection` matching `predicate`.
    ///
    /// A record that does not decode as `T` is logged and left out, so one
    /// bad entry never hides the rest of the collection.
    fn query<T, P>(
        &self,
        collection: &str,
        predicate: P,
    ) -> impl Future<Output = Result<Vec<T>, StoreError>> + Send
    where
        T: DeserializeOwned + Send,
        P: Fn(&T) -> bool + Send;

    /// Delete `key`. Returns whether it existed.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

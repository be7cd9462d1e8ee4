//! In-process store backed by a `BTreeMap`.
//!
//! Used by tests and by single-process deployments. Versions come from one
//! store-wide counter, so a key that is deleted and recreated never reuses a
//! version a transaction might have read earlier.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{RwLock, broadcast};

use crate::error::{StoreError, TxError};
use crate::keys;
use crate::store::{CHANGE_CAPACITY, Change, Store, Subscription};

#[derive(Debug)]
struct Entry {
    json: String,
    version: u64,
}

#[derive(Debug, Default)]
struct Entries {
    map: BTreeMap<String, Entry>,
    seq: u64,
}

impl Entries {
    fn version_of(&self, key: &str) -> u64 {
        self.map.get(key).map_or(0, |entry| entry.version)
    }

    fn put(&mut self, key: &str, json: String) {
        self.seq = self.seq.saturating_add(1);
        let version = self.seq;
        self.map.insert(key.to_owned(), Entry { json, version });
    }
}

struct Inner {
    entries: RwLock<Entries>,
    changes: broadcast::Sender<Change>,
    max_attempts: u32,
}

/// A [`Store`] held entirely in memory.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create an empty store whose transactions try at most `max_attempts`
    /// times.
    pub fn new(max_attempts: u32) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(Entries::default()),
                changes,
                max_attempts: max_attempts.max(1),
            }),
        }
    }

    /// Number of records currently stored.
    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.map.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.inner.entries.read().await.map.is_empty()
    }

    fn publish(&self, key: &str, value: Option<serde_json::Value>) {
        // Zero receivers is the normal case.
        self.inner
            .changes
            .send(Change {
                key: key.to_owned(),
                value,
            })
            .unwrap_or(0);
    }
}

impl Store for MemoryStore {
    async fn read<T>(&self, key: &str) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        let entries = self.inner.entries.read().await;
        entries
            .map
            .get(key)
            .map(|entry| serde_json::from_str(&entry.json))
            .transpose()
            .map_err(StoreError::from)
    }

    fn subscribe(&self, key: &str) -> Subscription {
        Subscription::new(key.to_owned(), self.inner.changes.subscribe())
    }

    async fn transact<T, O, E, F>(&self, key: &str, mut body: F) -> Result<O, TxError<E>>
    where
        T: Serialize + DeserializeOwned + Send,
        O: Send,
        E: Send,
        F: FnMut(Option<T>) -> Result<(T, O), E> + Send,
    {
        let attempts = self.inner.max_attempts;
        for attempt in 1..=attempts {
            let (current, read_version) = {
                let entries = self.inner.entries.read().await;
                let current = entries.map.get(key).map(|entry| entry.json.clone());
                (current, entries.version_of(key))
            };
            let value = current
                .as_deref()
                .map(serde_json::from_str::<T>)
                .transpose()
                .map_err(StoreError::from)?;

            let (next, output) = body(value).map_err(TxError::Aborted)?;
            let json_value = serde_json::to_value(&next).map_err(StoreError::from)?;

            let mut entries = self.inner.entries.write().await;
            if entries.version_of(key) != read_version {
                drop(entries);
                tracing::debug!(key, attempt, "transaction conflict, retrying");
                tokio::task::yield_now().await;
                continue;
            }
            entries.put(key, json_value.to_string());
            drop(entries);

            self.publish(key, Some(json_value));
            return Ok(output);
        }

        Err(StoreError::Conflict {
            key: key.to_owned(),
            attempts,
        }
        .into())
    }

    async fn append<T>(&self, collection: &str, id: &str, record: &T) -> Result<bool, StoreError>
    where
        T: Serialize + Sync,
    {
        let key = keys::record(collection, id);
        let json_value = serde_json::to_value(record)?;
        let mut entries = self.inner.entries.write().await;
        if entries.map.contains_key(&key) {
            return Ok(false);
        }
        entries.put(&key, json_value.to_string());
        drop(entries);

        self.publish(&key, Some(json_value));
        Ok(true)
    }

    async fn query<T, P>(&self, collection: &str, predicate: P) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned + Send,
        P: Fn(&T) -> bool + Send,
    {
        let prefix = format!("{collection}:");
        let entries = self.inner.entries.read().await;
        let mut matches = Vec::new();
        for (key, entry) in entries.map.range(prefix.clone()..) {
            if !key.starts_with(&prefix) {
                break;
            }
            if keys::collection_of(key) != collection {
                continue;
            }
            match serde_json::from_str::<T>(&entry.json) {
                Ok(record) if predicate(&record) => matches.push(record),
                Ok(_) => {}
                Err(e) => tracing::warn!(key = %key, error = %e, "Skipping undecodable record"),
            }
        }
        Ok(matches)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let existed = self.inner.entries.write().await.map.remove(key).is_some();
        if existed {
            self.publish(key, None);
        }
        Ok(existed)
    }
}

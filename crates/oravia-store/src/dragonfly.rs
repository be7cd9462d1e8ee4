//! `Dragonfly` (Redis-compatible) store backend.
//!
//! Shared by every kernel process, so optimistic transactions here are what
//! actually serialize concurrent writers.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `{collection}:{id}` | JSON | The record |
//! | `ver:{key}` | Integer | Version of the record at `key` |
//! | `index:{collection}` | Set | Keys of every record in the collection |
//! | `store:seq` | Integer | Source of versions |
//! | `changes:{key}` | Channel | Change feed of one key |
//!
//! Every commit runs as a Lua script so that the version check, the write,
//! and the index update happen atomically.

use fred::prelude::*;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;

use crate::error::{StoreError, TxError};
use crate::keys;
use crate::store::{CHANGE_CAPACITY, Change, Store, Subscription};

/// Key that hands out versions.
const SEQ_KEY: &str = "store:seq";

/// Channel prefix of the change feed.
const CHANGES_PREFIX: &str = "changes:";

/// Compare-and-set commit.
///
/// KEYS: record, version, index, seq. ARGV: expected version, json, member.
/// Returns the new version, or 0 when the expected version is stale.
const TRANSACT_SCRIPT: &str = r"
local current = tonumber(redis.call('GET', KEYS[2]) or '0')
if current ~= tonumber(ARGV[1]) then
  return 0
end
local version = redis.call('INCR', KEYS[4])
redis.call('SET', KEYS[1], ARGV[2])
redis.call('SET', KEYS[2], version)
redis.call('SADD', KEYS[3], ARGV[3])
return version
";

/// Insert-if-absent.
///
/// KEYS: record, version, index, seq. ARGV: json, member.
const APPEND_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
local version = redis.call('INCR', KEYS[4])
redis.call('SET', KEYS[1], ARGV[1])
redis.call('SET', KEYS[2], version)
redis.call('SADD', KEYS[3], ARGV[2])
return 1
";

/// Delete a record with its version and index entry.
///
/// KEYS: record, version, index. ARGV: member.
const DELETE_SCRIPT: &str = r"
local removed = redis.call('DEL', KEYS[1])
redis.call('DEL', KEYS[2])
redis.call('SREM', KEYS[3], ARGV[1])
return removed
";

fn version_key(key: &str) -> String {
    format!("ver:{key}")
}

fn index_key(collection: &str) -> String {
    format!("index:{collection}")
}

/// Keys touched by a commit of `key`, in script order.
fn commit_keys(key: &str) -> Vec<String> {
    vec![
        key.to_owned(),
        version_key(key),
        index_key(keys::collection_of(key)),
        SEQ_KEY.to_owned(),
    ]
}

/// Connection handle to a `Dragonfly` instance implementing [`Store`].
#[derive(Clone)]
pub struct DragonflyStore {
    client: Client,
    changes: broadcast::Sender<Change>,
    max_attempts: u32,
}

impl DragonflyStore {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// Opens a command connection and a second connection subscribed to the
    /// change feed. The URL follows the Redis scheme: `redis://host:port`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the URL cannot be parsed.
    /// Returns [`StoreError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str, max_attempts: u32) -> Result<Self, StoreError> {
        let config = Config::from_url(url)
            .map_err(|e| StoreError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config.clone()).build()?;
        client.init().await?;

        let subscriber = Builder::from_config(config).build()?;
        subscriber.init().await?;
        subscriber.psubscribe(format!("{CHANGES_PREFIX}*")).await?;

        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        tokio::spawn(forward_changes(subscriber, changes.clone()));

        tracing::info!("Connected to Dragonfly");
        Ok(Self {
            client,
            changes,
            max_attempts: max_attempts.max(1),
        })
    }

    /// Read a record's JSON and version in one round trip.
    async fn read_versioned(&self, key: &str) -> Result<(Option<String>, u64), StoreError> {
        let mut values: Vec<Option<String>> =
            self.client.mget(vec![key.to_owned(), version_key(key)]).await?;
        let version = values.pop().flatten();
        let json = values.pop().flatten();
        let version = match version {
            Some(raw) => raw.parse::<u64>().map_err(|e| StoreError::Corrupt {
                key: version_key(key),
                reason: e.to_string(),
            })?,
            None => 0,
        };
        Ok((json, version))
    }

    async fn publish(&self, key: &str, value: Option<serde_json::Value>) {
        let change = Change {
            key: key.to_owned(),
            value,
        };
        let payload = match serde_json::to_string(&change) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to encode change");
                return;
            }
        };
        let channel = format!("{CHANGES_PREFIX}{key}");
        let sent: Result<i64, _> = self.client.publish(channel, payload).await;
        if let Err(e) = sent {
            // The write is committed; only live watchers miss this change.
            tracing::warn!(key, error = %e, "Failed to publish change");
        }
    }

    /// Flush all keys from the `Dragonfly` instance.
    ///
    /// **WARNING:** This deletes all data. Only use for testing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Dragonfly`] if the flush fails.
    pub async fn flush_all(&self) -> Result<(), StoreError> {
        let _: () = self.client.flushall(false).await?;
        Ok(())
    }
}

/// Decode change-feed messages into the local broadcast channel.
async fn forward_changes(subscriber: Client, changes: broadcast::Sender<Change>) {
    let mut rx = subscriber.message_rx();
    loop {
        match rx.recv().await {
            Ok(message) => {
                let decoded = message
                    .value
                    .convert::<String>()
                    .ok()
                    .and_then(|payload| serde_json::from_str::<Change>(&payload).ok());
                match decoded {
                    Some(change) => {
                        changes.send(change).unwrap_or(0);
                    }
                    None => {
                        tracing::debug!(channel = ?message.channel, "Ignoring undecodable change message");
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!(skipped = n, "Change feed lagged, skipping ahead");
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::info!("Change feed closed");
                return;
            }
        }
    }
}

impl Store for DragonflyStore {
    async fn read<T>(&self, key: &str) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        let value: Option<String> = self.client.get(key).await?;
        value
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(StoreError::from)
    }

    fn subscribe(&self, key: &str) -> Subscription {
        Subscription::new(key.to_owned(), self.changes.subscribe())
    }

    async fn transact<T, O, E, F>(&self, key: &str, mut body: F) -> Result<O, TxError<E>>
    where
        T: Serialize + DeserializeOwned + Send,
        O: Send,
        E: Send,
        F: FnMut(Option<T>) -> Result<(T, O), E> + Send,
    {
        let attempts = self.max_attempts;
        for attempt in 1..=attempts {
            let (current, read_version) = self.read_versioned(key).await?;
            let value = current
                .as_deref()
                .map(serde_json::from_str::<T>)
                .transpose()
                .map_err(StoreError::from)?;

            let (next, output) = body(value).map_err(TxError::Aborted)?;
            let json_value = serde_json::to_value(&next).map_err(StoreError::from)?;

            let committed: i64 = self
                .client
                .eval(
                    TRANSACT_SCRIPT,
                    commit_keys(key),
                    vec![read_version.to_string(), json_value.to_string(), key.to_owned()],
                )
                .await
                .map_err(StoreError::from)?;
            if committed == 0 {
                tracing::debug!(key, attempt, "transaction conflict, retrying");
                continue;
            }

            self.publish(key, Some(json_value)).await;
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
        let inserted: i64 = self
            .client
            .eval(
                APPEND_SCRIPT,
                commit_keys(&key),
                vec![json_value.to_string(), key.clone()],
            )
            .await?;
        if inserted == 0 {
            return Ok(false);
        }
        self.publish(&key, Some(json_value)).await;
        Ok(true)
    }

    async fn query<T, P>(&self, collection: &str, predicate: P) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned + Send,
        P: Fn(&T) -> bool + Send,
    {
        let members: Vec<String> = self.client.smembers(index_key(collection)).await?;
        if members.is_empty() {
            return Ok(Vec::new());
        }
        let values: Vec<Option<String>> = self.client.mget(members.clone()).await?;

        let mut matches = Vec::new();
        // Members deleted since SMEMBERS read back as nil.
        for (key, json) in members.iter().zip(values) {
            let Some(json) = json else { continue };
            match serde_json::from_str::<T>(&json) {
                Ok(record) if predicate(&record) => matches.push(record),
                Ok(_) => {}
                Err(e) => tracing::warn!(key = %key, error = %e, "Skipping undecodable record"),
            }
        }
        Ok(matches)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let removed: i64 = self
            .client
            .eval(
                DELETE_SCRIPT,
                vec![
                    key.to_owned(),
                    version_key(key),
                    index_key(keys::collection_of(key)),
                ],
                vec![key.to_owned()],
            )
            .await?;
        let existed = removed > 0;
        if existed {
            self.publish(key, None).await;
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_keys_follow_the_script_order() {
        let keys = commit_keys("reports:u1:r9");
        assert_eq!(
            keys,
            vec![
                "reports:u1:r9".to_owned(),
                "ver:reports:u1:r9".to_owned(),
                "index:reports:u1".to_owned(),
                "store:seq".to_owned(),
            ]
        );
    }
}

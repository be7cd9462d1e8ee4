//! Election of the single active scheduler.
//!
//! Every engine process may run a scheduler loop, but only the holder of the
//! `scheduler:lease` record ticks. The lease is taken and renewed through
//! [`Store::transact`], so two processes racing for an expired lease cannot
//! both win.

use chrono::{DateTime, Duration, Utc};
use oravia_store::{Store, StoreError, TxError, keys};
use serde::{Deserialize, Serialize};

/// The stored election record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerLease {
    /// Instance currently allowed to tick.
    pub holder: String,
    /// Instant after which any instance may take over.
    pub expires_at: DateTime<Utc>,
}

impl SchedulerLease {
    /// Whether `instance` may take or renew the lease at `now`.
    pub fn available_to(&self, instance: &str, now: DateTime<Utc>) -> bool {
        self.holder == instance || self.expires_at <= now
    }
}

/// Lease is held by another instance.
#[derive(Debug)]
struct HeldElsewhere;

/// One instance's handle on the scheduler lease.
#[derive(Debug, Clone)]
pub struct Lease<S> {
    store: S,
    holder: String,
    ttl: Duration,
}

impl<S: Store> Lease<S> {
    /// Create a handle for `holder` whose grants last `ttl_ms`.
    pub fn new(store: S, holder: impl Into<String>, ttl_ms: u64) -> Self {
        let ttl = i64::try_from(ttl_ms)
            .ok()
            .and_then(Duration::try_milliseconds)
            .unwrap_or(Duration::MAX);
        Self {
            store,
            holder: holder.into(),
            ttl,
        }
    }

    /// Name this handle holds the lease under.
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Take the lease, or extend it if already held, until `now + ttl`.
    ///
    /// Returns `false` when another instance holds an unexpired lease.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store fails or the lease record keeps
    /// changing until the retry budget runs out.
    pub async fn try_acquire(&self, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let expires_at = now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let outcome = self
            .store
            .transact(keys::SCHEDULER_LEASE, |current: Option<SchedulerLease>| {
                if current.is_some_and(|lease| !lease.available_to(&self.holder, now)) {
                    return Err(HeldElsewhere);
                }
                let granted = SchedulerLease {
                    holder: self.holder.clone(),
                    expires_at,
                };
                Ok((granted, ()))
            })
            .await;
        match outcome {
            Ok(()) => Ok(true),
            Err(TxError::Aborted(HeldElsewhere)) => Ok(false),
            Err(TxError::Store(e)) => Err(e),
        }
    }

    /// Give the lease up so another instance can take it immediately.
    ///
    /// Returns `false` if this instance was not the holder.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store fails.
    pub async fn release(&self, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let outcome = self
            .store
            .transact(keys::SCHEDULER_LEASE, |current: Option<SchedulerLease>| {
                match current {
                    Some(lease) if lease.holder == self.holder => Ok((
                        SchedulerLease {
                            holder: lease.holder,
                            expires_at: now,
                        },
                        (),
                    )),
                    _ => Err(HeldElsewhere),
                }
            })
            .await;
        match outcome {
            Ok(()) => Ok(true),
            Err(TxError::Aborted(HeldElsewhere)) => Ok(false),
            Err(TxError::Store(e)) => Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use oravia_store::MemoryStore;

    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(1_767_225_600_000).unwrap()
    }

    #[tokio::test]
    async fn only_one_holder_until_expiry() {
        let store = MemoryStore::new(5);
        let a = Lease::new(store.clone(), "a", 10_000);
        let b = Lease::new(store.clone(), "b", 10_000);

        assert!(a.try_acquire(t0()).await.unwrap());
        assert!(!b.try_acquire(t0() + Duration::seconds(5)).await.unwrap());
        assert!(a.try_acquire(t0() + Duration::seconds(5)).await.unwrap());
        // Renewal at +5s pushed expiry to +15s.
        assert!(!b.try_acquire(t0() + Duration::seconds(12)).await.unwrap());
        assert!(b.try_acquire(t0() + Duration::seconds(15)).await.unwrap());
        assert!(!a.try_acquire(t0() + Duration::seconds(16)).await.unwrap());

        let stored: SchedulerLease = store.read(keys::SCHEDULER_LEASE).await.unwrap().unwrap();
        assert_eq!(stored.holder, "b");
    }

    #[tokio::test]
    async fn release_hands_over_immediately() {
        let store = MemoryStore::new(5);
        let a = Lease::new(store.clone(), "a", 60_000);
        let b = Lease::new(store, "b", 60_000);

        assert!(a.try_acquire(t0()).await.unwrap());
        assert!(!b.release(t0()).await.unwrap());
        assert!(a.release(t0() + Duration::seconds(1)).await.unwrap());
        assert!(b.try_acquire(t0() + Duration::seconds(1)).await.unwrap());
    }

    #[tokio::test]
    async fn racing_instances_elect_exactly_one() {
        let store = MemoryStore::new(32);
        let mut handles = Vec::new();
        for i in 0..8 {
            let lease = Lease::new(store.clone(), format!("node-{i}"), 10_000);
            handles.push(tokio::spawn(async move { lease.try_acquire(t0()).await.unwrap() }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}

//! In-process key-value store with per-entry expiry.

use super::{Clock, KeyValueStore, StoreError, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}

/// `DashMap`-backed store. Expired entries are dropped lazily on read and
/// periodically by [`run_expiry_sweep`].
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store that reads time from `clock` (tests pass a `ManualClock`).
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = match ttl {
            Some(ttl) if ttl <= Duration::zero() => {
                return Err(StoreError::InvalidTtl {
                    key: key.to_string(),
                    seconds: ttl.num_seconds(),
                });
            }
            Some(ttl) => match self.clock.now().checked_add_signed(ttl) {
                Some(at) => Some(at),
                None => {
                    return Err(StoreError::InvalidTtl {
                        key: key.to_string(),
                        seconds: ttl.num_seconds(),
                    });
                }
            },
            None => None,
        };

        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        tracing::trace!(key = %key, ttl_seconds = ?ttl.map(|t| t.num_seconds()), "Key set");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();

        // The read guard must be released before remove_if touches the shard.
        {
            match self.entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        tracing::trace!(key = %key, "Expired key dropped on read");
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = self.clock.now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }
}

/// Background task to periodically purge expired entries.
pub async fn run_expiry_sweep(store: Arc<MemoryStore>, interval_seconds: u64) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_seconds.max(1)));

    loop {
        interval.tick().await;
        let removed = store.purge_expired();
        tracing::debug!(
            "Store expiry sweep complete, removed {}, {} entries remaining",
            removed,
            store.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ManualClock;

    fn store_with_clock() -> (MemoryStore, ManualClock) {
        let clock = ManualClock::new();
        (MemoryStore::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();

        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));

        assert!(store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);

        // Deleting again reports nothing removed
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = MemoryStore::new();

        store.set("k", "first", None).await.unwrap();
        store.set("k", "second", None).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some("second".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let (store, clock) = store_with_clock();

        store
            .set("k", "v", Some(Duration::seconds(300)))
            .await
            .unwrap();

        clock.advance(Duration::seconds(299));
        assert!(store.get("k").await.unwrap().is_some());

        clock.advance(Duration::seconds(1));
        assert!(store.get("k").await.unwrap().is_none());

        // Lazy removal dropped the entry
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_resets_ttl() {
        let (store, clock) = store_with_clock();

        store.set("k", "v1", Some(Duration::seconds(10))).await.unwrap();
        clock.advance(Duration::seconds(8));
        store.set("k", "v2", Some(Duration::seconds(10))).await.unwrap();
        clock.advance(Duration::seconds(8));

        assert_eq!(store.get("k").await.unwrap(), Some("v2".to_string()));
    }

    #[tokio::test]
    async fn test_non_positive_ttl_rejected() {
        let store = MemoryStore::new();

        let err = store
            .set("k", "v", Some(Duration::zero()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTtl { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_rejected() {
        let store = MemoryStore::new();

        let err = store
            .set("k", "v", Some(Duration::days(365 * 1_000_000)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTtl { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_expired_reports_false() {
        let (store, clock) = store_with_clock();

        store.set("k", "v", Some(Duration::seconds(1))).await.unwrap();
        clock.advance(Duration::seconds(2));

        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_removes_only_expired() {
        let (store, clock) = store_with_clock();

        store.set("short", "v", Some(Duration::seconds(1))).await.unwrap();
        store.set("long", "v", Some(Duration::seconds(600))).await.unwrap();
        store.set("forever", "v", None).await.unwrap();
        assert_eq!(store.len(), 3);

        clock.advance(Duration::seconds(2));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 2);
        assert!(store.get("long").await.unwrap().is_some());
        assert!(store.get("forever").await.unwrap().is_some());
    }
}

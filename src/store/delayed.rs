//! Store wrapper that sleeps before every operation, for interleaving tests.

use super::{KeyValueStore, StoreError};
use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;

pub(crate) struct DelayedStore {
    inner: Arc<dyn KeyValueStore>,
    delay: std::time::Duration,
}

impl DelayedStore {
    pub(crate) fn new(inner: Arc<dyn KeyValueStore>, delay_ms: u64) -> Self {
        Self {
            inner,
            delay: std::time::Duration::from_millis(delay_ms),
        }
    }
}

#[async_trait]
impl KeyValueStore for DelayedStore {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.set(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.delete(key).await
    }
}

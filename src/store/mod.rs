//! Ephemeral key-value storage for in-flight OAuth state and cached credentials.
//!
//! Every value written here is short-lived: state records, PKCE verifiers and
//! credential payloads all carry a TTL and disappear on their own if nobody
//! reads them. Components receive the store as an `Arc<dyn KeyValueStore>`
//! handle, so the in-memory implementation can be swapped for a networked
//! backend without touching the OAuth code.
//!
//! # Usage
//!
//! ```no_run
//! use integration_gateway::store::{KeyValueStore, MemoryStore};
//! use chrono::Duration;
//!
//! # async fn demo() -> Result<(), integration_gateway::store::StoreError> {
//! let store = MemoryStore::new();
//! store.set("hubspot_state:o1:u1", "{}", Some(Duration::seconds(300))).await?;
//! assert!(store.get("hubspot_state:o1:u1").await?.is_some());
//! store.delete("hubspot_state:o1:u1").await?;
//! # Ok(())
//! # }
//! ```

mod clock;
#[cfg(test)]
pub(crate) mod delayed;
mod memory;

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::{run_expiry_sweep, MemoryStore};

use async_trait::async_trait;
use chrono::Duration;
use thiserror::Error;

/// Errors surfaced by a key-value backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or rejected the command.
    #[error("key-value store unavailable: {0}")]
    Unavailable(String),

    /// A TTL of zero or less was requested.
    #[error("invalid TTL for key '{key}': {seconds}s")]
    InvalidTtl { key: String, seconds: i64 },
}

/// Addressable, expiring string store.
///
/// Implementations must be safe to share across request handlers. Values
/// written with a TTL must become unreadable once it elapses.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Write `value` under `key`, replacing any previous value.
    ///
    /// With `ttl = None` the entry never expires.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Read the live value for `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Remove `key`. Returns whether a live value was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

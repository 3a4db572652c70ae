//! Timestamped cache envelopes and their two-tier store.

use crate::store::LocalStore;
use crate::Result;
use chrono::Utc;
use mini_moka::sync::Cache;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// A payload plus the moment it was fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEnvelope<T> {
    pub payload: T,
    pub fetched_at_epoch_ms: i64,
}

impl<T> CacheEnvelope<T> {
    /// Envelope stamped with the current time.
    pub fn new(payload: T) -> Self {
        Self::with_timestamp(payload, now_epoch_ms())
    }

    pub fn with_timestamp(payload: T, fetched_at_epoch_ms: i64) -> Self {
        Self {
            payload,
            fetched_at_epoch_ms,
        }
    }

    /// Milliseconds since the fetch, never negative.
    pub fn age_ms(&self) -> i64 {
        (now_epoch_ms() - self.fetched_at_epoch_ms).max(0)
    }

    pub fn age(&self) -> Duration {
        Duration::from_millis(self.age_ms().unsigned_abs())
    }

    /// `now - fetchedAt < ttl`.
    pub fn is_valid(&self, ttl: Duration) -> bool {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        now_epoch_ms() - self.fetched_at_epoch_ms < ttl_ms
    }
}

/// One envelope under a fixed key, fronted by an in-memory TTL tier.
///
/// The persisted entry is replaced whole on every save and is only removed by
/// [`invalidate`](Self::invalidate).
pub struct EnvelopeStore<T> {
    key: String,
    store: Arc<dyn LocalStore>,
    memory: Cache<String, CacheEnvelope<T>>,
    ttl: Duration,
}

impl<T> EnvelopeStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(key: impl Into<String>, store: Arc<dyn LocalStore>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            store,
            memory: Cache::builder()
                .time_to_live(ttl.max(Duration::from_millis(1)))
                .max_capacity(1)
                .build(),
            ttl,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The envelope if it is still within the TTL.
    pub fn load_valid(&self) -> Option<CacheEnvelope<T>> {
        if let Some(envelope) = self.memory.get(&self.key) {
            if envelope.is_valid(self.ttl) {
                debug!("Cache hit (memory) for {}", self.key);
                return Some(envelope);
            }
        }

        let envelope = self.load_persisted()?;
        if !envelope.is_valid(self.ttl) {
            return None;
        }
        debug!("Cache hit (store) for {}", self.key);
        self.memory.insert(self.key.clone(), envelope.clone());
        Some(envelope)
    }

    /// The most recent envelope regardless of age.
    pub fn load(&self) -> Option<CacheEnvelope<T>> {
        self.memory
            .get(&self.key)
            .or_else(|| self.load_persisted())
    }

    /// Encode and write an envelope to both tiers.
    ///
    /// Fails only when the envelope cannot be encoded. A store write failure
    /// is logged and leaves the memory tier holding the new envelope.
    pub fn save(&self, envelope: &CacheEnvelope<T>) -> Result<()> {
        let encoded = serde_json::to_string(envelope)?;
        self.memory.insert(self.key.clone(), envelope.clone());
        if let Err(e) = self.store.set(&self.key, &encoded) {
            warn!("Failed to persist cache entry {}: {}", self.key, e);
        }
        Ok(())
    }

    /// Drop both tiers.
    pub fn invalidate(&self) {
        self.memory.invalidate(&self.key);
        if let Err(e) = self.store.remove(&self.key) {
            warn!("Failed to remove cache entry {}: {}", self.key, e);
        }
    }

    fn load_persisted(&self) -> Option<CacheEnvelope<T>> {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read cache entry {}: {}", self.key, e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                warn!("Ignoring corrupt cache entry {}: {}", self.key, e);
                None
            }
        }
    }
}

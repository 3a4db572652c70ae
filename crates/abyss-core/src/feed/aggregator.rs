//! Multi-source feed aggregation with per-source stale fallback.
//!
//! A refresh fans out to every source at once. Each source's outcome is
//! merged on its own: a success is fresh, a failure falls back to that
//! source's entry from the last persisted batch, and with nothing to fall
//! back on the source contributes an explicit placeholder. One failing source
//! never fails the batch.

use super::envelope::{now_epoch_ms, CacheEnvelope, EnvelopeStore};
use crate::config::FeedConfig;
use crate::network::ApiError;
use crate::store::LocalStore;
use crate::{AbyssError, Result};
use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How current an aggregate item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Fetched in this refresh.
    Fresh,
    /// Served from the previous batch because this refresh's fetch failed.
    Stale,
    /// Placeholder; no live or cached data exists.
    Unavailable,
}

/// One source's slot in an aggregate batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateItem<T> {
    pub source: String,
    /// 0 for placeholders.
    pub fetched_at_epoch_ms: i64,
    pub freshness: Freshness,
    pub data: T,
}

impl<T> AggregateItem<T> {
    pub fn is_degraded(&self) -> bool {
        self.freshness != Freshness::Fresh
    }
}

/// An independently fetchable unit of a feed.
#[async_trait]
pub trait FeedSource<T>: Send + Sync {
    /// Stable identity, used to match a source against the previous batch.
    fn id(&self) -> &str;

    async fn fetch(&self) -> std::result::Result<T, ApiError>;

    /// Empty value shown when the source has neither live nor cached data.
    fn placeholder(&self) -> T;
}

pub type DynFeedSource<T> = Arc<dyn FeedSource<T>>;

/// Cache state for "last updated" and "may be outdated" indicators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatus {
    pub has_cache: bool,
    pub is_valid: bool,
    pub age_seconds: Option<u64>,
    pub last_fetched_epoch_ms: Option<i64>,
    pub item_count: Option<usize>,
    /// Items in the cached batch that are stale or placeholders.
    pub degraded_count: Option<usize>,
}

/// TTL-cached aggregate over a fixed, ordered list of sources.
pub struct FeedAggregator<T> {
    sources: Vec<DynFeedSource<T>>,
    cache: EnvelopeStore<Vec<AggregateItem<T>>>,
}

impl<T> FeedAggregator<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(
        key: impl Into<String>,
        store: Arc<dyn LocalStore>,
        sources: Vec<DynFeedSource<T>>,
    ) -> Self {
        Self {
            sources,
            cache: EnvelopeStore::new(key, store, FeedConfig::DEFAULT_TTL),
        }
    }

    pub fn with_ttl(
        key: impl Into<String>,
        store: Arc<dyn LocalStore>,
        sources: Vec<DynFeedSource<T>>,
        ttl: Duration,
    ) -> Self {
        Self {
            sources,
            cache: EnvelopeStore::new(key, store, ttl),
        }
    }

    pub fn key(&self) -> &str {
        self.cache.key()
    }

    pub fn ttl(&self) -> Duration {
        self.cache.ttl()
    }

    pub fn sources(&self) -> &[DynFeedSource<T>] {
        &self.sources
    }

    /// Return the aggregate, fetching only when the cache is missing, expired
    /// or `force_refresh` is set.
    ///
    /// Items always follow source order and every source has exactly one
    /// item. The only error is [`AbyssError::FeedUnavailable`], raised when
    /// the batch itself cannot be completed and nothing was cached before.
    /// When something was cached, its items are served as stale instead.
    pub async fn refresh(&self, force_refresh: bool) -> Result<Vec<AggregateItem<T>>> {
        if !force_refresh {
            if let Some(envelope) = self.cache.load_valid() {
                debug!("Serving cached {} ({} items)", self.key(), envelope.payload.len());
                return Ok(envelope.payload);
            }
        }

        let previous = self.cache.load();
        let outcomes = join_all(
            self.sources
                .iter()
                .map(|source| AssertUnwindSafe(source.fetch()).catch_unwind()),
        )
        .await;

        let now = now_epoch_ms();
        let items: Vec<AggregateItem<T>> = self
            .sources
            .iter()
            .zip(outcomes)
            .map(|(source, outcome)| match outcome {
                Ok(Ok(data)) => AggregateItem {
                    source: source.id().to_string(),
                    fetched_at_epoch_ms: now,
                    freshness: Freshness::Fresh,
                    data,
                },
                Ok(Err(e)) => {
                    warn!("{} source {} failed: {}", self.key(), source.id(), e);
                    self.fallback_item(source.as_ref(), previous.as_ref())
                }
                Err(_) => {
                    warn!("{} source {} panicked during fetch", self.key(), source.id());
                    self.fallback_item(source.as_ref(), previous.as_ref())
                }
            })
            .collect();

        let envelope = CacheEnvelope::with_timestamp(items, now);
        if let Err(e) = self.cache.save(&envelope) {
            return match previous {
                Some(previous) => {
                    warn!(
                        "Could not store {} batch ({}), serving previous batch",
                        self.key(),
                        e
                    );
                    Ok(previous
                        .payload
                        .into_iter()
                        .map(|item| match item.freshness {
                            Freshness::Unavailable => item,
                            _ => AggregateItem {
                                freshness: Freshness::Stale,
                                ..item
                            },
                        })
                        .collect())
                }
                None => Err(AbyssError::FeedUnavailable {
                    feed: self.key().to_string(),
                    message: e.to_string(),
                }),
            };
        }

        let count = |freshness: Freshness| {
            envelope
                .payload
                .iter()
                .filter(|item| item.freshness == freshness)
                .count()
        };
        info!(
            "Refreshed {}: {} fresh, {} stale, {} unavailable",
            self.key(),
            count(Freshness::Fresh),
            count(Freshness::Stale),
            count(Freshness::Unavailable)
        );

        Ok(envelope.payload)
    }

    /// The last stored batch regardless of age.
    pub fn cached(&self) -> Option<CacheEnvelope<Vec<AggregateItem<T>>>> {
        self.cache.load()
    }

    pub fn status(&self) -> FeedStatus {
        let Some(envelope) = self.cache.load() else {
            return FeedStatus::default();
        };

        FeedStatus {
            has_cache: true,
            is_valid: envelope.is_valid(self.ttl()),
            age_seconds: Some(envelope.age().as_secs()),
            last_fetched_epoch_ms: Some(envelope.fetched_at_epoch_ms),
            item_count: Some(envelope.payload.len()),
            degraded_count: Some(
                envelope
                    .payload
                    .iter()
                    .filter(|item| item.is_degraded())
                    .count(),
            ),
        }
    }

    /// Drop the cached batch so the next refresh fetches.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    fn fallback_item(
        &self,
        source: &dyn FeedSource<T>,
        previous: Option<&CacheEnvelope<Vec<AggregateItem<T>>>>,
    ) -> AggregateItem<T> {
        let cached = previous.and_then(|envelope| {
            envelope.payload.iter().find(|item| {
                item.source == source.id() && item.freshness != Freshness::Unavailable
            })
        });

        match cached {
            Some(item) => AggregateItem {
                freshness: Freshness::Stale,
                ..item.clone()
            },
            None => AggregateItem {
                source: source.id().to_string(),
                fetched_at_epoch_ms: 0,
                freshness: Freshness::Unavailable,
                data: source.placeholder(),
            },
        }
    }
}

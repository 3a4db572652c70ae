//! Abyss Core - client-side data layer for the From Abyss front end.
//!
//! Every remote call goes through one engine, [`ApiClient`], which applies
//! interceptors, enforces a timeout, retries transient failures and turns
//! every failure into an [`ApiError`]. Feeds that combine several upstream
//! sources use [`FeedAggregator`], a TTL cache that degrades per source to
//! stale data instead of failing the whole feed.
//!
//! # Example
//!
//! ```rust,ignore
//! use abyss_core::{ApiClient, ClientSettings, FileStore, RequestOptions};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> abyss_core::Result<()> {
//!     let settings = ClientSettings::from_env()?;
//!     let store = Arc::new(FileStore::default_location()?);
//!     let client = ApiClient::standard(&settings, store)?;
//!
//!     let tiers: serde_json::Value = client
//!         .get("/api/tiers", RequestOptions::new().with_retry(2))
//!         .await?;
//!     println!("{tiers}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod feed;
pub mod network;
pub mod store;

// Re-export commonly used types
pub use config::{BuildProfile, ClientSettings, FeedConfig, NetworkConfig};
pub use error::{AbyssError, Result};
pub use feed::{
    roadmap_feed, AggregateItem, CacheEnvelope, FeedAggregator, FeedSource, FeedStatus, Freshness,
    RepoRoadmap, TrackedRepo,
};
pub use network::{
    ApiClient, ApiError, HttpMethod, InterceptorRegistry, MultipartForm, Payload, RawResponse,
    RequestBody, RequestConfig, RequestOptions,
};
pub use store::{FileStore, LocalStore, MemoryStore};

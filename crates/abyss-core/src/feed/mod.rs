//! Cached multi-source feeds.
//!
//! This module provides:
//! - `CacheEnvelope` and its memory + local store tiers
//! - `FeedAggregator`, fan-out with per-source stale fallback
//! - The roadmap feed over tracked GitHub repositories

mod aggregator;
mod envelope;
mod roadmap;

pub use aggregator::{AggregateItem, DynFeedSource, FeedAggregator, FeedSource, FeedStatus, Freshness};
pub use envelope::{now_epoch_ms, CacheEnvelope, EnvelopeStore};
pub use roadmap::{
    roadmap_feed, GitHubIssue, GitHubLabel, GitHubMilestone, GitHubUser, MilestoneRef,
    RepoRoadmap, RepoRoadmapSource, TrackedRepo,
};

//! Integration tests for the feed aggregator and the roadmap feed.

use abyss_core::feed::{DynFeedSource, RepoRoadmapSource};
use abyss_core::network::RateLimitWatcher;
use abyss_core::{
    AbyssError, AggregateItem, ApiClient, ApiError, BuildProfile, CacheEnvelope, ClientSettings,
    FeedAggregator, FeedSource, FileStore, Freshness, InterceptorRegistry, LocalStore,
    MemoryStore, RepoRoadmap, TrackedRepo,
};
use async_trait::async_trait;
use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const KEY: &str = "test_feed";

/// Source with a switchable outcome and a call counter.
struct MockSource {
    id: &'static str,
    calls: AtomicUsize,
    failing: AtomicBool,
    delay: Duration,
}

impl MockSource {
    fn new(id: &'static str) -> Arc<Self> {
        Arc::new(Self {
            id,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            delay: Duration::ZERO,
        })
    }

    fn failing(id: &'static str) -> Arc<Self> {
        let source = Self::new(id);
        source.set_failing(true);
        source
    }

    fn slow(id: &'static str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            id,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            delay,
        })
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource<String> for MockSource {
    fn id(&self) -> &str {
        self.id
    }

    async fn fetch(&self) -> Result<String, ApiError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            Err(ApiError::network("connection reset"))
        } else {
            Ok(format!("{}-live-{}", self.id, call))
        }
    }

    fn placeholder(&self) -> String {
        String::new()
    }
}

struct PanickingSource;

#[async_trait]
impl FeedSource<String> for PanickingSource {
    fn id(&self) -> &str {
        "panics"
    }

    async fn fetch(&self) -> Result<String, ApiError> {
        panic!("source blew up");
    }

    fn placeholder(&self) -> String {
        "placeholder".to_string()
    }
}

fn dyn_sources(sources: &[&Arc<MockSource>]) -> Vec<DynFeedSource<String>> {
    sources
        .iter()
        .map(|source| Arc::clone(source) as DynFeedSource<String>)
        .collect()
}

fn item(source: &str, fetched_at: i64, data: &str) -> AggregateItem<String> {
    AggregateItem {
        source: source.to_string(),
        fetched_at_epoch_ms: fetched_at,
        freshness: Freshness::Fresh,
        data: data.to_string(),
    }
}

fn seed(store: &dyn LocalStore, items: Vec<AggregateItem<String>>, fetched_at: i64) {
    let envelope = CacheEnvelope::with_timestamp(items, fetched_at);
    store
        .set(KEY, &serde_json::to_string(&envelope).unwrap())
        .unwrap();
}

fn expired_timestamp() -> i64 {
    abyss_core::feed::now_epoch_ms() - 11 * 60 * 1000
}

#[tokio::test]
async fn test_failed_source_falls_back_to_its_cached_entry() {
    let store = Arc::new(MemoryStore::new());
    let old = expired_timestamp();
    seed(
        store.as_ref(),
        vec![
            item("a", old, "a-cached"),
            item("b", old - 5, "b-cached"),
            item("c", old, "c-cached"),
        ],
        old,
    );

    let (a, b, c) = (MockSource::new("a"), MockSource::failing("b"), MockSource::new("c"));
    let aggregator = FeedAggregator::new(KEY, store.clone(), dyn_sources(&[&a, &b, &c]));

    let items = aggregator.refresh(false).await.unwrap();

    let sources: Vec<&str> = items.iter().map(|item| item.source.as_str()).collect();
    assert_eq!(sources, vec!["a", "b", "c"]);

    assert_eq!(items[0].freshness, Freshness::Fresh);
    assert_eq!(items[0].data, "a-live-1");
    assert_eq!(items[1].freshness, Freshness::Stale);
    assert_eq!(items[1].data, "b-cached");
    assert_eq!(items[1].fetched_at_epoch_ms, old - 5);
    assert_eq!(items[2].freshness, Freshness::Fresh);
    assert_eq!(items[2].data, "c-live-1");

    assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 1));

    // The merged batch replaced the seeded envelope.
    let stored = aggregator.cached().unwrap();
    assert_eq!(stored.payload, items);
}

#[tokio::test]
async fn test_all_sources_failing_without_cache_yields_placeholders() {
    let (a, b, c) = (
        MockSource::failing("a"),
        MockSource::failing("b"),
        MockSource::failing("c"),
    );
    let aggregator = FeedAggregator::new(
        KEY,
        Arc::new(MemoryStore::new()),
        dyn_sources(&[&a, &b, &c]),
    );

    let items = aggregator.refresh(true).await.unwrap();

    assert_eq!(items.len(), 3);
    for (item, id) in items.iter().zip(["a", "b", "c"]) {
        assert_eq!(item.source, id);
        assert_eq!(item.freshness, Freshness::Unavailable);
        assert_eq!(item.fetched_at_epoch_ms, 0);
        assert_eq!(item.data, "");
    }
}

#[tokio::test]
async fn test_refresh_within_ttl_issues_no_calls() {
    let store = Arc::new(MemoryStore::new());
    let (a, b, c) = (MockSource::new("a"), MockSource::new("b"), MockSource::new("c"));
    let aggregator = FeedAggregator::new(KEY, store.clone(), dyn_sources(&[&a, &b, &c]));

    let first = aggregator.refresh(false).await.unwrap();
    let second = aggregator.refresh(false).await.unwrap();

    assert_eq!(first, second);
    assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 1));

    // A fresh aggregator over the same store is served from the store tier.
    let cold = FeedAggregator::new(KEY, store, dyn_sources(&[&a, &b, &c]));
    assert_eq!(cold.refresh(false).await.unwrap(), first);
    assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 1));

    // Forcing bypasses the cache.
    let forced = aggregator.refresh(true).await.unwrap();
    assert_eq!(forced[0].data, "a-live-2");
    assert_eq!((a.calls(), b.calls(), c.calls()), (2, 2, 2));
}

#[tokio::test]
async fn test_expired_cache_triggers_fetch() {
    let store = Arc::new(MemoryStore::new());
    let a = MockSource::new("a");
    let aggregator = FeedAggregator::with_ttl(
        KEY,
        store,
        dyn_sources(&[&a]),
        Duration::from_millis(30),
    );

    aggregator.refresh(false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    let items = aggregator.refresh(false).await.unwrap();

    assert_eq!(a.calls(), 2);
    assert_eq!(items[0].data, "a-live-2");
}

#[tokio::test]
async fn test_failed_forced_refresh_keeps_stale_entries() {
    let store = Arc::new(MemoryStore::new());
    let (a, b) = (MockSource::new("a"), MockSource::new("b"));
    let aggregator = FeedAggregator::new(KEY, store, dyn_sources(&[&a, &b]));

    let first = aggregator.refresh(false).await.unwrap();
    a.set_failing(true);
    b.set_failing(true);

    let items = aggregator.refresh(true).await.unwrap();
    assert!(items.iter().all(|item| item.freshness == Freshness::Stale));
    assert_eq!(items[0].data, first[0].data);
    assert_eq!(items[0].fetched_at_epoch_ms, first[0].fetched_at_epoch_ms);
    assert_eq!(aggregator.status().degraded_count, Some(2));
}

#[tokio::test]
async fn test_persisted_envelope_roundtrip_is_byte_identical() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FileStore::new(temp_dir.path()));
    let (a, b) = (MockSource::new("a"), MockSource::failing("b"));

    let writer = FeedAggregator::new(KEY, store.clone(), dyn_sources(&[&a, &b]));
    writer.refresh(true).await.unwrap();
    let persisted = store.get(KEY).unwrap().unwrap();

    let reader = FeedAggregator::new(KEY, store.clone(), dyn_sources(&[&a, &b]));
    let payload = reader.refresh(false).await.unwrap();
    let envelope = reader.cached().unwrap();

    assert_eq!(envelope.payload, payload);
    assert_eq!(serde_json::to_string(&envelope).unwrap(), persisted);
    assert_eq!(a.calls(), 1);
}

#[tokio::test]
async fn test_panicking_source_is_isolated() {
    let a = MockSource::new("a");
    let sources: Vec<DynFeedSource<String>> = vec![
        a.clone() as DynFeedSource<String>,
        Arc::new(PanickingSource),
    ];
    let aggregator = FeedAggregator::new(KEY, Arc::new(MemoryStore::new()), sources);

    let items = aggregator.refresh(true).await.unwrap();

    assert_eq!(items[0].freshness, Freshness::Fresh);
    assert_eq!(items[1].source, "panics");
    assert_eq!(items[1].freshness, Freshness::Unavailable);
    assert_eq!(items[1].data, "placeholder");
}

#[tokio::test(start_paused = true)]
async fn test_sources_fetch_concurrently() {
    let delay = Duration::from_millis(300);
    let (a, b, c) = (
        MockSource::slow("a", delay),
        MockSource::slow("b", delay),
        MockSource::slow("c", delay),
    );
    let aggregator = FeedAggregator::new(
        KEY,
        Arc::new(MemoryStore::new()),
        dyn_sources(&[&a, &b, &c]),
    );

    let started = tokio::time::Instant::now();
    let items = aggregator.refresh(true).await.unwrap();

    assert_eq!(items.len(), 3);
    assert_eq!(started.elapsed(), delay);
}

/// Payload whose encoding fails for one value, to break the batch itself.
#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Fragile(u32);

impl Serialize for Fragile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0 == 13 {
            Err(serde::ser::Error::custom("unlucky value"))
        } else {
            serializer.serialize_u32(self.0)
        }
    }
}

struct FragileSource;

#[async_trait]
impl FeedSource<Fragile> for FragileSource {
    fn id(&self) -> &str {
        "fragile"
    }

    async fn fetch(&self) -> Result<Fragile, ApiError> {
        Ok(Fragile(13))
    }

    fn placeholder(&self) -> Fragile {
        Fragile(0)
    }
}

#[tokio::test]
async fn test_batch_failure_serves_previous_envelope() {
    let store = Arc::new(MemoryStore::new());
    store
        .set(
            KEY,
            &json!({
                "payload": [
                    {"source": "fragile", "fetchedAtEpochMs": 1, "freshness": "fresh", "data": 7},
                    {"source": "gone", "fetchedAtEpochMs": 0, "freshness": "unavailable", "data": 0}
                ],
                "fetchedAtEpochMs": 1
            })
            .to_string(),
        )
        .unwrap();

    let aggregator = FeedAggregator::new(KEY, store, vec![Arc::new(FragileSource) as DynFeedSource<Fragile>]);
    let items = aggregator.refresh(true).await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].data, Fragile(7));
    assert_eq!(items[0].freshness, Freshness::Stale);
    assert_eq!(items[0].fetched_at_epoch_ms, 1);
    assert_eq!(items[1].freshness, Freshness::Unavailable);
    assert_eq!(aggregator.cached().unwrap().fetched_at_epoch_ms, 1);
}

#[tokio::test]
async fn test_batch_failure_without_cache_is_terminal() {
    let aggregator = FeedAggregator::new(
        KEY,
        Arc::new(MemoryStore::new()),
        vec![Arc::new(FragileSource) as DynFeedSource<Fragile>],
    );

    let err = aggregator.refresh(false).await.unwrap_err();
    match err {
        AbyssError::FeedUnavailable { feed, .. } => assert_eq!(feed, KEY),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(aggregator.cached().is_none());
}

// Roadmap feed against a fake GitHub API.

async fn milestones(Path((owner, repo)): Path<(String, String)>) -> impl IntoResponse {
    if repo == "limited" {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "message": "API rate limit exceeded" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!([{
            "id": 1,
            "title": format!("{} {} beta", owner, repo),
            "description": null,
            "state": "open",
            "open_issues": 1,
            "closed_issues": 3,
            "due_on": null,
            "html_url": "https://github.com/o/r/milestone/1",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-02T00:00:00Z"
        }])),
    )
}

async fn issues(headers: HeaderMap) -> impl IntoResponse {
    if headers.get("accept").and_then(|v| v.to_str().ok()) != Some("application/vnd.github.v3+json")
    {
        return (StatusCode::NOT_ACCEPTABLE, Json(json!({ "message": "bad accept" })));
    }
    let issue = |id: u64, pr: bool| {
        let mut value = json!({
            "id": id,
            "number": id,
            "title": format!("Issue {}", id),
            "body": null,
            "state": "open",
            "html_url": format!("https://github.com/o/r/issues/{}", id),
            "labels": [{ "name": "roadmap", "color": "5319e7" }],
            "milestone": { "title": "beta" },
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-02T00:00:00Z",
            "user": { "login": "lovecraft", "avatar_url": "" }
        });
        if pr {
            value["pull_request"] = json!({ "url": "https://api.github.com/repos/o/r/pulls/2" });
        }
        value
    };
    (StatusCode::OK, Json(json!([issue(1, false), issue(2, true)])))
}

#[tokio::test]
async fn test_roadmap_feed_against_fake_github() {
    let app = Router::new()
        .route("/repos/:owner/:repo/milestones", get(milestones))
        .route("/repos/:owner/:repo/issues", get(issues));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let api_base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_base = format!("http://{}", dead.local_addr().unwrap());
    drop(dead);

    let settings = ClientSettings::new(&api_base, BuildProfile::Development);
    let client = Arc::new(ApiClient::new(&settings, Arc::new(InterceptorRegistry::new())).unwrap());

    let good = TrackedRepo::new("TellurianCorp", "from-abyss-api", "From Abyss API", "API");
    let limited = TrackedRepo::new("TellurianCorp", "limited", "Limited", "Rate limited");
    let offline = TrackedRepo::new("FromAbyssStudio", "koliseum", "Koliseum", "Offline");

    let sources: Vec<DynFeedSource<RepoRoadmap>> = vec![
        Arc::new(RepoRoadmapSource::with_api_base(client.clone(), good, &api_base)),
        Arc::new(RepoRoadmapSource::with_api_base(client.clone(), limited, &api_base)),
        Arc::new(RepoRoadmapSource::with_api_base(client.clone(), offline, &dead_base)),
    ];
    let aggregator = FeedAggregator::new(
        abyss_core::FeedConfig::ROADMAP_CACHE_KEY,
        Arc::new(MemoryStore::new()),
        sources,
    );

    let items = aggregator.refresh(true).await.unwrap();

    let good = &items[0];
    assert_eq!(good.freshness, Freshness::Fresh);
    assert_eq!(good.data.repo, "TellurianCorp/from-abyss-api");
    assert_eq!(good.data.milestones.len(), 1);
    assert_eq!(good.data.milestones[0].progress_percent(), 75);
    assert_eq!(good.data.issues.len(), 1, "pull requests are filtered out");
    assert!(good.data.last_fetched > 0);

    let limited = &items[1];
    assert_eq!(limited.freshness, Freshness::Fresh);
    assert!(limited.data.milestones.is_empty());
    assert_eq!(limited.data.issues.len(), 1);

    let offline = &items[2];
    assert_eq!(offline.freshness, Freshness::Unavailable);
    assert_eq!(offline.data.repo, "FromAbyssStudio/koliseum");
    assert_eq!(offline.data.display_name, "Koliseum");
    assert_eq!(offline.data.last_fetched, 0);
}

#[tokio::test]
async fn test_roadmap_source_tracks_github_rate_limit() {
    let app = Router::new()
        .route(
            "/repos/:owner/:repo/milestones",
            get(|| async { ([("x-ratelimit-remaining", "2")], Json(json!([]))) }),
        )
        .route(
            "/repos/:owner/:repo/issues",
            get(|| async { ([("x-ratelimit-remaining", "1")], Json(json!([]))) }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let api_base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // The standard registry carries no rate-limit interceptor of its own.
    let settings = ClientSettings::new(&api_base, BuildProfile::Development);
    let client = Arc::new(ApiClient::standard(&settings, Arc::new(MemoryStore::new())).unwrap());

    let watcher = RateLimitWatcher::default();
    let repo = TrackedRepo::new("TellurianCorp", "from-abyss-api", "From Abyss API", "API");
    let source = RepoRoadmapSource::with_api_base(client, repo, &api_base)
        .with_rate_limit_watcher(watcher.clone());
    assert_eq!(watcher.remaining(), None);

    let roadmap = source.fetch().await.unwrap();
    assert!(roadmap.milestones.is_empty());

    let remaining = watcher.remaining().unwrap();
    assert!(remaining == 1 || remaining == 2, "unexpected budget {}", remaining);
    assert_eq!(source.rate_limit().remaining(), Some(remaining));
}

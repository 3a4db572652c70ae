//! Request and response interceptors.
//!
//! Two append-only ordered lists live on an [`InterceptorRegistry`] that is
//! handed to the [`ApiClient`](super::ApiClient) at construction. Request
//! interceptors run before every attempt; response interceptors run on every
//! completed exchange before the engine decides success, retry or error.

use super::{RawResponse, RequestConfig};
use crate::config::{ClientSettings, NetworkConfig};
use crate::store::LocalStore;
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};
use url::{Origin, Url};

/// Pre-flight transform of an outgoing request.
pub trait RequestInterceptor: Send + Sync {
    fn intercept(&self, config: RequestConfig) -> RequestConfig;
}

impl<F> RequestInterceptor for F
where
    F: Fn(RequestConfig) -> RequestConfig + Send + Sync,
{
    fn intercept(&self, config: RequestConfig) -> RequestConfig {
        self(config)
    }
}

/// Post-flight transform of a buffered response.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn intercept(&self, response: RawResponse) -> RawResponse;
}

#[async_trait]
impl<F> ResponseInterceptor for F
where
    F: Fn(RawResponse) -> RawResponse + Send + Sync,
{
    async fn intercept(&self, response: RawResponse) -> RawResponse {
        self(response)
    }
}

pub type DynRequestInterceptor = Arc<dyn RequestInterceptor>;
pub type DynResponseInterceptor = Arc<dyn ResponseInterceptor>;

/// Ordered interceptor lists shared by every call of a client.
///
/// There is no removal. Folds work on a snapshot of the list, so an append
/// during an in-flight call only affects later calls.
#[derive(Default)]
pub struct InterceptorRegistry {
    request: RwLock<Vec<DynRequestInterceptor>>,
    response: RwLock<Vec<DynResponseInterceptor>>,
}

impl std::fmt::Debug for InterceptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorRegistry")
            .field("request", &self.request_snapshot().len())
            .field("response", &self.response_snapshot().len())
            .finish()
    }
}

impl InterceptorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry for a normal deployment: bearer credentials from the local
    /// store, plus response logging outside production.
    pub fn standard(settings: &ClientSettings, store: Arc<dyn LocalStore>) -> Self {
        let registry = Self::new();
        registry.add_request_interceptor(CredentialInterceptor::for_base_url(
            store,
            &settings.base_url,
        ));
        if !settings.profile.is_production() {
            registry.add_response_interceptor(LoggingInterceptor);
        }
        registry
    }

    /// Append a request interceptor; it runs after those already registered.
    pub fn add_request_interceptor(&self, interceptor: impl RequestInterceptor + 'static) {
        self.request
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(interceptor));
    }

    /// Append a response interceptor; it runs after those already registered.
    pub fn add_response_interceptor(&self, interceptor: impl ResponseInterceptor + 'static) {
        self.response
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(interceptor));
    }

    /// Number of registered request interceptors.
    pub fn request_count(&self) -> usize {
        self.request_snapshot().len()
    }

    /// Number of registered response interceptors.
    pub fn response_count(&self) -> usize {
        self.response_snapshot().len()
    }

    /// Fold the request list left to right: `f` then `g` yields `g(f(config))`.
    pub fn apply_request_interceptors(&self, config: RequestConfig) -> RequestConfig {
        self.request_snapshot()
            .iter()
            .fold(config, |config, interceptor| interceptor.intercept(config))
    }

    /// Run every response interceptor in order, awaiting each one.
    pub async fn apply_response_interceptors(&self, mut response: RawResponse) -> RawResponse {
        for interceptor in self.response_snapshot() {
            response = interceptor.intercept(response).await;
        }
        response
    }

    fn request_snapshot(&self) -> Vec<DynRequestInterceptor> {
        self.request
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn response_snapshot(&self) -> Vec<DynResponseInterceptor> {
        self.response
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Attaches `Authorization: Bearer <token>` when a session token is stored.
///
/// The token is read on every request, so signing in or out takes effect on
/// the next call. When scoped to an origin, requests elsewhere (third-party
/// APIs called through the same client) go out without it.
pub struct CredentialInterceptor {
    store: Arc<dyn LocalStore>,
    key: String,
    scope: Option<Origin>,
}

impl CredentialInterceptor {
    /// Attach the token to every request.
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            store,
            key: NetworkConfig::AUTH_TOKEN_KEY.to_string(),
            scope: None,
        }
    }

    /// Attach the token only to requests for the origin of `base_url`.
    pub fn for_base_url(store: Arc<dyn LocalStore>, base_url: &str) -> Self {
        let mut interceptor = Self::new(store);
        interceptor.scope = Url::parse(base_url).ok().map(|url| url.origin());
        interceptor
    }

    fn in_scope(&self, url: &str) -> bool {
        match &self.scope {
            None => true,
            Some(origin) => Url::parse(url).is_ok_and(|url| url.origin() == *origin),
        }
    }
}

impl RequestInterceptor for CredentialInterceptor {
    fn intercept(&self, mut config: RequestConfig) -> RequestConfig {
        if !self.in_scope(&config.url) {
            return config;
        }
        match self.store.get(&self.key) {
            Ok(Some(token)) if !token.trim().is_empty() => {
                config.set_header("authorization", format!("Bearer {}", token.trim()));
            }
            Ok(_) => {}
            Err(e) => warn!("Could not read session token: {}", e),
        }
        config
    }
}

/// Emits `[API] <url> - <status> <statusText>` for every response.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

#[async_trait]
impl ResponseInterceptor for LoggingInterceptor {
    async fn intercept(&self, response: RawResponse) -> RawResponse {
        debug!(
            "[API] {} - {} {}",
            response.url,
            response.status.as_u16(),
            response.status_text()
        );
        response
    }
}

/// Tracks `X-RateLimit-Remaining` and warns when it runs low.
///
/// Clones share the observed value, so a caller can keep one handle and
/// register another.
#[derive(Debug, Clone)]
pub struct RateLimitWatcher {
    remaining: Arc<AtomicI64>,
    threshold: i64,
}

impl Default for RateLimitWatcher {
    fn default() -> Self {
        Self::new(NetworkConfig::RATE_LIMIT_WARN_THRESHOLD)
    }
}

impl RateLimitWatcher {
    pub fn new(threshold: i64) -> Self {
        Self {
            remaining: Arc::new(AtomicI64::new(-1)),
            threshold,
        }
    }

    /// Last observed remaining budget, if any response carried one.
    pub fn remaining(&self) -> Option<i64> {
        let remaining = self.remaining.load(Ordering::SeqCst);
        (remaining >= 0).then_some(remaining)
    }

    /// Record the response's remaining budget, warning below the threshold.
    pub fn observe(&self, response: &RawResponse) {
        let Some(remaining) = response
            .header("x-ratelimit-remaining")
            .and_then(|value| value.trim().parse::<i64>().ok())
        else {
            return;
        };

        self.remaining.store(remaining, Ordering::SeqCst);
        if remaining < self.threshold {
            warn!(
                "Rate limit nearly exhausted for {}: {} requests remaining",
                response.url, remaining
            );
        }
    }
}

#[async_trait]
impl ResponseInterceptor for RateLimitWatcher {
    async fn intercept(&self, response: RawResponse) -> RawResponse {
        self.observe(&response);
        response
    }
}

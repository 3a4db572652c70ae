//! The resilient call engine.
//!
//! Every request the data layer makes goes through [`ApiClient`]:
//! - Endpoint resolution against the configured base URL
//! - Default JSON headers merged under caller headers
//! - Request and response interceptors on every attempt
//! - A client-enforced timeout covering the whole exchange
//! - Fixed-delay retry of transport failures and 5xx responses
//! - Normalization of every failure into [`ApiError`]

use super::interceptor::InterceptorRegistry;
use super::request::{HttpMethod, MultipartForm, RequestBody, RequestConfig, RequestOptions};
use super::response::{Payload, RawResponse};
use super::retry::{retry_async, RetryPolicy};
use super::ApiError;
use crate::config::{ClientSettings, NetworkConfig};
use crate::store::LocalStore;
use crate::{AbyssError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

const CONTENT_TYPE: &str = "content-type";
const ACCEPT: &str = "accept";
const JSON_MIME: &str = "application/json";

/// HTTP client every feature module calls through.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    default_timeout: Duration,
    interceptors: Arc<InterceptorRegistry>,
}

impl ApiClient {
    /// Create a client with an explicit interceptor registry.
    pub fn new(settings: &ClientSettings, interceptors: Arc<InterceptorRegistry>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(NetworkConfig::USER_AGENT)
            .cookie_store(true)
            .build()
            .map_err(|e| AbyssError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: Some(e.to_string()),
            })?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            default_timeout: settings.default_timeout,
            interceptors,
        })
    }

    /// Create a client with the standard interceptors for `settings`.
    pub fn standard(settings: &ClientSettings, store: Arc<dyn LocalStore>) -> Result<Self> {
        let registry = InterceptorRegistry::standard(settings, store);
        Self::new(settings, Arc::new(registry))
    }

    /// Get the base URL endpoints are resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the timeout used when a call sets none.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// The registry shared by every call of this client.
    pub fn interceptors(&self) -> &Arc<InterceptorRegistry> {
        &self.interceptors
    }

    /// Resolve an endpoint to an absolute URL.
    ///
    /// Endpoints starting with `http` are used verbatim. Anything else is
    /// joined to the base URL with exactly one `/`.
    pub fn resolve_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http") {
            return endpoint.to_string();
        }
        let path = endpoint.strip_prefix('/').unwrap_or(endpoint);
        format!("{}/{}", self.base_url, path)
    }

    /// GET `endpoint` and decode the body.
    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> std::result::Result<T, ApiError> {
        self.request(HttpMethod::Get, endpoint, RequestBody::Empty, options)
            .await
    }

    /// POST an optional JSON body.
    pub async fn post<T, B>(
        &self,
        endpoint: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> std::result::Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(HttpMethod::Post, endpoint, json_body(body)?, options)
            .await
    }

    /// PUT an optional JSON body.
    pub async fn put<T, B>(
        &self,
        endpoint: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> std::result::Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(HttpMethod::Put, endpoint, json_body(body)?, options)
            .await
    }

    /// PATCH an optional JSON body.
    pub async fn patch<T, B>(
        &self,
        endpoint: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> std::result::Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(HttpMethod::Patch, endpoint, json_body(body)?, options)
            .await
    }

    /// DELETE `endpoint` and decode the body.
    pub async fn delete<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> std::result::Result<T, ApiError> {
        self.request(HttpMethod::Delete, endpoint, RequestBody::Empty, options)
            .await
    }

    /// POST a multipart form.
    ///
    /// No `Content-Type` is ever set here, not even one the caller or an
    /// interceptor supplied; the transport writes it with the boundary.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        form: MultipartForm,
        options: RequestOptions,
    ) -> std::result::Result<T, ApiError> {
        self.request(HttpMethod::Post, endpoint, RequestBody::Multipart(form), options)
            .await
    }

    /// Issue a call and decode the success body into `T`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: RequestBody,
        options: RequestOptions,
    ) -> std::result::Result<T, ApiError> {
        let response = self.dispatch(method, endpoint, body, options).await?;
        let status = response.status;
        response.into_payload()?.decode(status)
    }

    /// Issue a call and return the success body undecoded.
    pub async fn request_payload(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: RequestBody,
        options: RequestOptions,
    ) -> std::result::Result<Payload, ApiError> {
        self.dispatch(method, endpoint, body, options)
            .await?
            .into_payload()
    }

    /// Issue a call and return the successful response with its headers.
    ///
    /// Retry, timeout, interceptors and error normalization apply as for
    /// [`ApiClient::request`]; only decoding is left to the caller.
    pub async fn request_raw(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: RequestBody,
        options: RequestOptions,
    ) -> std::result::Result<RawResponse, ApiError> {
        self.dispatch(method, endpoint, body, options).await
    }

    async fn dispatch(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: RequestBody,
        options: RequestOptions,
    ) -> std::result::Result<RawResponse, ApiError> {
        let is_upload = matches!(body, RequestBody::Multipart(_));
        let url = self.resolve_url(endpoint);
        let headers = merge_headers(&options.headers, is_upload);
        let policy = RetryPolicy::new(
            options.retry,
            options.retry_delay.unwrap_or(NetworkConfig::RETRY_DELAY),
        );
        let timeout = options
            .timeout
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or(self.default_timeout);

        let (result, stats) = retry_async(
            &policy,
            |attempt| {
                let config = RequestConfig {
                    method,
                    url: url.clone(),
                    headers: headers.clone(),
                    body: body.clone(),
                    retry_count: policy.retry_count.saturating_sub(attempt),
                    retry_delay: policy.retry_delay,
                    timeout,
                };
                self.execute(config, is_upload)
            },
            ApiError::is_retryable,
        )
        .await;

        if let Err(e) = &result {
            debug!(
                "{} {} failed after {} attempt(s): {} {}",
                method,
                url,
                stats.attempts,
                e.status(),
                e.message()
            );
        }
        result
    }

    /// One attempt: interceptors, timed exchange, classification.
    async fn execute(
        &self,
        config: RequestConfig,
        is_upload: bool,
    ) -> std::result::Result<RawResponse, ApiError> {
        let mut config = self.interceptors.apply_request_interceptors(config);
        if is_upload {
            config.remove_header(CONTENT_TYPE);
        }
        let timeout = if config.timeout.is_zero() {
            self.default_timeout
        } else {
            config.timeout
        };

        let request = self.build_request(&config)?;
        debug!(
            "{} {} ({} retries left, timeout {:?})",
            config.method, config.url, config.retry_count, timeout
        );

        let response = match tokio::time::timeout(timeout, self.send(request)).await {
            Err(_) => return Err(ApiError::timeout()),
            Ok(Err(e)) if e.is_timeout() => return Err(ApiError::timeout()),
            Ok(Err(e)) => return Err(ApiError::network(e)),
            Ok(Ok(response)) => response,
        };

        let response = self.interceptors.apply_response_interceptors(response).await;
        if !response.is_success() {
            return Err(response.into_error());
        }
        Ok(response)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<RawResponse, reqwest::Error> {
        let response = request.send().await?;
        RawResponse::read(response).await
    }

    fn build_request(
        &self,
        config: &RequestConfig,
    ) -> std::result::Result<reqwest::RequestBuilder, ApiError> {
        let url = Url::parse(&config.url).map_err(|e| {
            ApiError::invalid_request(format!("invalid URL '{}': {}", config.url, e))
        })?;

        let mut headers = HeaderMap::with_capacity(config.headers.len());
        for (name, value) in &config.headers {
            let name =
                HeaderName::from_bytes(name.as_bytes()).map_err(ApiError::invalid_request)?;
            let value = HeaderValue::from_str(value).map_err(ApiError::invalid_request)?;
            headers.insert(name, value);
        }

        let builder = self
            .client
            .request(config.method.to_reqwest(), url)
            .headers(headers);

        Ok(match &config.body {
            RequestBody::Empty => builder,
            RequestBody::Text(text) => builder.body(text.clone()),
            RequestBody::Multipart(form) => {
                builder.multipart(form.to_reqwest().map_err(ApiError::invalid_request)?)
            }
        })
    }
}

/// Defaults first, caller headers over them. Uploads carry no content type.
fn merge_headers(caller: &BTreeMap<String, String>, is_upload: bool) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    if !is_upload {
        headers.insert(CONTENT_TYPE.to_string(), JSON_MIME.to_string());
    }
    headers.insert(ACCEPT.to_string(), JSON_MIME.to_string());
    for (name, value) in caller {
        headers.insert(name.to_ascii_lowercase(), value.clone());
    }
    if is_upload {
        headers.remove(CONTENT_TYPE);
    }
    headers
}

fn json_body<B: Serialize + ?Sized>(body: Option<&B>) -> std::result::Result<RequestBody, ApiError> {
    match body {
        None => Ok(RequestBody::Empty),
        Some(body) => serde_json::to_string(body)
            .map(RequestBody::Text)
            .map_err(ApiError::encoding),
    }
}

//! Network layer: the call engine and its collaborators.
//!
//! This module provides:
//! - `ApiClient`, the single chokepoint for remote calls
//! - Request/response interceptor pipeline
//! - Fixed-delay retry
//! - `ApiError`, the normalized call error

mod client;
mod error;
mod interceptor;
mod request;
mod response;
mod retry;

pub use client::ApiClient;
pub use error::ApiError;
pub use interceptor::{
    CredentialInterceptor, DynRequestInterceptor, DynResponseInterceptor, InterceptorRegistry,
    LoggingInterceptor, RateLimitWatcher, RequestInterceptor, ResponseInterceptor,
};
pub use request::{FormPart, HttpMethod, MultipartForm, RequestBody, RequestConfig, RequestOptions};
pub use response::{Payload, RawResponse};
pub use retry::{retry_async, RetryPolicy, RetryStats};

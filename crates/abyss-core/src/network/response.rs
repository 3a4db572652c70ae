//! Buffered responses and decoded payloads.

use super::ApiError;
use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A fully buffered transport response, as response interceptors see it.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub url: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(url: impl Into<String>, status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            url: url.into(),
            status,
            headers,
            body,
        }
    }

    pub(crate) async fn read(response: reqwest::Response) -> Result<Self, reqwest::Error> {
        let url = response.url().to_string();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(Self::new(url, status, headers, body))
    }

    /// Canonical reason phrase, empty for non-standard codes.
    pub fn status_text(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or_default()
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    pub fn is_json(&self) -> bool {
        self.content_type()
            .is_some_and(|value| value.to_ascii_lowercase().contains("application/json"))
    }

    /// Decode a success body by its content type.
    pub fn into_payload(self) -> Result<Payload, ApiError> {
        if self.is_json() {
            if self.body.iter().all(u8::is_ascii_whitespace) {
                return Ok(Payload::Json(Value::Null));
            }
            serde_json::from_slice(&self.body)
                .map(Payload::Json)
                .map_err(|e| ApiError::decode(self.status, e))
        } else {
            Ok(Payload::Text(String::from_utf8_lossy(&self.body).into_owned()))
        }
    }

    /// Normalize a non-success response.
    pub fn into_error(self) -> ApiError {
        ApiError::from_response(self.status, &self.body)
    }
}

/// A decoded success body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Json(_) => None,
        }
    }

    /// Deserialize into a caller type.
    ///
    /// Text bodies are offered as a JSON string and an empty text body as
    /// `null`, so `String`, `()` and `Option<_>` all decode bodiless or plain
    /// responses.
    pub fn decode<T: DeserializeOwned>(self, status: StatusCode) -> Result<T, ApiError> {
        let value = match self {
            Payload::Json(value) => value,
            Payload::Text(text) if text.is_empty() => Value::Null,
            Payload::Text(text) => Value::String(text),
        };
        serde_json::from_value(value).map_err(|e| ApiError::decode(status, e))
    }
}

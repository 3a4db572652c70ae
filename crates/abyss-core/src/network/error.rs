//! The normalized call error.
//!
//! Every failure that leaves [`ApiClient`](super::ApiClient) has this shape:
//! an upstream non-success response, a client-side timeout, or a transport
//! failure where no response arrived at all.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const TIMEOUT_STATUS_TEXT: &str = "Request Timeout";
const TIMEOUT_MESSAGE: &str = "Request timed out";
const NETWORK_STATUS_TEXT: &str = "Network Error";
const NETWORK_MESSAGE: &str = "Network request failed. Please check your connection.";

/// Uniform error surfaced to every consumer of the call engine.
///
/// `status` is 0 when no HTTP round trip completed, 408 when the client gave
/// up waiting, and the upstream status otherwise.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct ApiError {
    status: u16,
    status_text: String,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl ApiError {
    /// Normalize a completed non-success response.
    ///
    /// The message comes from a JSON `message` or `error` field when present,
    /// then from a plain-text body, then from the status line.
    pub fn from_response(status: StatusCode, body: &[u8]) -> Self {
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        let status_line = if status_text.is_empty() {
            format!("HTTP {}", status.as_u16())
        } else {
            status_text.clone()
        };

        let (message, details) = match serde_json::from_slice::<Value>(body) {
            Ok(json) => (extract_message(&json).unwrap_or(status_line), Some(json)),
            Err(_) => match std::str::from_utf8(body).map(str::trim) {
                Ok(text) if !text.is_empty() => (text.to_string(), None),
                _ => (status_line, None),
            },
        };

        Self {
            status: status.as_u16(),
            status_text,
            message,
            details,
        }
    }

    /// The client-enforced timeout elapsed before the exchange completed.
    pub fn timeout() -> Self {
        Self {
            status: StatusCode::REQUEST_TIMEOUT.as_u16(),
            status_text: TIMEOUT_STATUS_TEXT.to_string(),
            message: TIMEOUT_MESSAGE.to_string(),
            details: None,
        }
    }

    /// No response arrived (DNS, refused connection, TLS, reset).
    pub fn network(cause: impl std::fmt::Display) -> Self {
        Self {
            status: 0,
            status_text: NETWORK_STATUS_TEXT.to_string(),
            message: NETWORK_MESSAGE.to_string(),
            details: Some(Value::String(cause.to_string())),
        }
    }

    /// The request could not be built, so nothing was sent.
    pub fn invalid_request(cause: impl std::fmt::Display) -> Self {
        Self {
            status: 0,
            status_text: "Invalid Request".to_string(),
            message: format!("Request could not be built: {}", cause),
            details: None,
        }
    }

    /// The request body could not be serialized.
    pub fn encoding(cause: impl std::fmt::Display) -> Self {
        Self {
            status: 0,
            status_text: "Encoding Error".to_string(),
            message: format!("Failed to encode request body: {}", cause),
            details: None,
        }
    }

    /// A success response whose body did not decode into the expected type.
    pub fn decode(status: StatusCode, cause: impl std::fmt::Display) -> Self {
        Self {
            status: status.as_u16(),
            status_text: "Decode Error".to_string(),
            message: format!("Failed to decode response body: {}", cause),
            details: None,
        }
    }

    /// HTTP status, or 0 when no response was received.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Reason phrase or error category.
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Response body or failure cause, when available.
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Check if the client-side timeout expired.
    pub fn is_timeout(&self) -> bool {
        self.status == StatusCode::REQUEST_TIMEOUT.as_u16()
    }

    /// Check if no response was received.
    pub fn is_network(&self) -> bool {
        self.status == 0
    }

    /// Check for a 5xx status.
    pub fn is_server_error(&self) -> bool {
        (500..=599).contains(&self.status)
    }

    /// Check for a 4xx status.
    pub fn is_client_error(&self) -> bool {
        (400..=499).contains(&self.status)
    }

    /// The transport failed with no response. Requests that could not be
    /// built also carry status 0 but are not transport failures.
    pub fn is_transport(&self) -> bool {
        self.is_network() && self.status_text == NETWORK_STATUS_TEXT
    }

    /// Transport failures and 5xx responses are worth another attempt.
    /// Timeouts, 4xx responses and unbuildable requests are not.
    pub fn is_retryable(&self) -> bool {
        self.is_transport() || self.is_server_error()
    }
}

fn extract_message(json: &Value) -> Option<String> {
    ["message", "error"]
        .iter()
        .find_map(|field| match json.get(field)? {
            Value::Null | Value::Bool(false) => None,
            Value::String(text) if text.is_empty() => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        })
}

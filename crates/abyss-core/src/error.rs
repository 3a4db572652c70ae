//! Error types for the Abyss data layer.
//!
//! Call results surface [`ApiError`](crate::network::ApiError), the normalized
//! shape UI consumers render. Everything that is not a call result (settings,
//! local store, feed orchestration) uses [`AbyssError`].

use crate::network::ApiError;
use std::path::PathBuf;
use thiserror::Error;

/// Crate-level error type.
#[derive(Debug, Error)]
pub enum AbyssError {
    // Remote call errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    // Local store errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Feed errors
    #[error("Feed {feed} unavailable: {message}")]
    FeedUnavailable { feed: String, message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for Abyss operations.
pub type Result<T> = std::result::Result<T, AbyssError>;

impl From<std::io::Error> for AbyssError {
    fn from(err: std::io::Error) -> Self {
        AbyssError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for AbyssError {
    fn from(err: serde_json::Error) -> Self {
        AbyssError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl AbyssError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        AbyssError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// The normalized call error, if this error wraps one.
    pub fn as_api_error(&self) -> Option<&ApiError> {
        match self {
            AbyssError::Api(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AbyssError::FeedUnavailable {
            feed: "roadmap".into(),
            message: "no cached data".into(),
        };
        assert_eq!(err.to_string(), "Feed roadmap unavailable: no cached data");
    }

    #[test]
    fn test_api_error_conversion() {
        let err: AbyssError = ApiError::timeout().into();
        assert_eq!(err.as_api_error().map(ApiError::status), Some(408));
        let err = AbyssError::Config {
            message: "missing base URL".into(),
        };
        assert!(err.as_api_error().is_none());
    }

    #[test]
    fn test_io_with_path() {
        let err = AbyssError::io_with_path(
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            "/tmp/store",
        );
        match err {
            AbyssError::Io { path, .. } => assert_eq!(path, Some(PathBuf::from("/tmp/store"))),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

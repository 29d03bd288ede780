//! Error types for convoreplay.
//!
//! Library crates use [`ReplayError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::ContextKind;

/// Top-level error type for all convoreplay operations.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The locator could not be interpreted by the selected source.
    #[error("invalid locator: {message}")]
    InvalidLocator { message: String },

    /// The hosting service reported 404 (missing or private resource).
    #[error("{resource} is private or does not exist")]
    NotFound { resource: String },

    /// The hosting service reported 403 (unauthenticated rate limit hit).
    #[error("API rate limit exceeded: {url}")]
    RateLimited { url: String },

    /// Any other non-2xx response.
    #[error("request failed: {url}: HTTP {status}")]
    RequestFailed { url: String, status: u16 },

    /// Transport-level failure (DNS, connect, TLS, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// A body that should have been a JSON document was not.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A JSON body of the wrong shape for the API being called.
    #[error("malformed API response: {message}")]
    MalformedResponse { message: String },

    /// The source listing contains nothing that looks like a conversation.
    #[error("no conversation file found in {location}")]
    NoConversationFile { location: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Binary context media is rendered from its url and never prefetched.
    #[error("prefetching not supported for type: {kind}")]
    NotPrefetchable { kind: ContextKind },

    /// Scheduler-side failure (superseded queue, dropped loader).
    #[error("prefetch error: {0}")]
    Prefetch(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ReplayError>;

impl ReplayError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an invalid-locator error.
    pub fn invalid_locator(msg: impl Into<String>) -> Self {
        Self::InvalidLocator {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a malformed-response error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Map an HTTP status onto the retrieval error taxonomy.
    ///
    /// 404 and 403 carry dedicated meaning on the hosting APIs; everything
    /// else non-2xx is a plain request failure.
    pub fn from_status(url: &str, status: u16, resource: &str) -> Self {
        match status {
            404 => Self::NotFound {
                resource: resource.to_string(),
            },
            403 => Self::RateLimited {
                url: url.to_string(),
            },
            _ => Self::RequestFailed {
                url: url.to_string(),
                status,
            },
        }
    }
}

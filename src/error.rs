//! Error types for antidel
//!
//! This module provides the error taxonomy used by the relay pipeline:
//! - Feed API failures (transport, status, malformed body), which skip a poll cycle
//! - Asset download failures (status, short read, bad URL), retried by the downloader
//! - Telegram Bot API failures, split into timeout-class and rejected-request-class
//!
//! Whether an error is worth retrying is decided by [`crate::retry::IsRetryable`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for antidel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for antidel
///
/// Each variant includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "telegram.chat_id")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Feed API error
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    /// Asset download error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Telegram Bot API error
    #[error("telegram error: {0}")]
    Telegram(#[from] TelegramError),

    /// Shutdown in progress
    #[error("shutdown in progress")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Feed API errors
#[derive(Debug, Error)]
pub enum FeedError {
    /// The feed endpoint answered with a non-success status
    #[error("topic {topic} returned HTTP {status}")]
    Status {
        /// Topic identifier that was queried
        topic: String,
        /// HTTP status code
        status: u16,
    },

    /// The response body could not be decoded into posts
    #[error("malformed response for topic {topic}: {reason}")]
    Malformed {
        /// Topic identifier that was queried
        topic: String,
        /// What was wrong with the body
        reason: String,
    },

    /// The video endpoint answered with a non-success status
    #[error("video lookup for post {post_id} returned HTTP {status}")]
    VideoStatus {
        /// Post identifier
        post_id: String,
        /// HTTP status code
        status: u16,
    },

    /// The video lookup succeeded but named no playable URL
    #[error("video lookup for post {post_id} failed: {reason}")]
    VideoUnavailable {
        /// Post identifier
        post_id: String,
        /// The reason the lookup failed
        reason: String,
    },
}

/// Asset download errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The asset host answered with a non-success status
    #[error("HTTP {status} fetching {url}")]
    Status {
        /// Source URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Fewer bytes arrived than the server declared
    #[error("short read for {url}: got {received} of {expected} bytes")]
    ShortRead {
        /// Source URL
        url: String,
        /// Declared Content-Length
        expected: u64,
        /// Bytes actually received
        received: u64,
    },

    /// The URL cannot be mapped to a cache key
    #[error("invalid asset URL {url}: {reason}")]
    InvalidUrl {
        /// Source URL
        url: String,
        /// Why the URL was rejected
        reason: String,
    },

    /// Writing the asset into the cache failed
    #[error("failed to store asset at {path}: {source}")]
    Store {
        /// Destination path in the cache
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Telegram Bot API errors
#[derive(Debug, Error)]
pub enum TelegramError {
    /// The request did not complete within the client timeout
    #[error("{method} timed out")]
    TimedOut {
        /// API method that was called (e.g., "sendPhoto")
        method: &'static str,
    },

    /// The platform rejected the payload (HTTP 400)
    #[error("{method} rejected: {description}")]
    BadRequest {
        /// API method that was called
        method: &'static str,
        /// Description returned by the platform
        description: String,
    },

    /// The platform asked the client to slow down (HTTP 429)
    #[error("{method} rate limited, retry after {retry_after:?}s")]
    RateLimited {
        /// API method that was called
        method: &'static str,
        /// Suggested wait in seconds, if the platform sent one
        retry_after: Option<u64>,
    },

    /// Any other API-level failure
    #[error("{method} failed with code {code}: {description}")]
    Api {
        /// API method that was called
        method: &'static str,
        /// Error code returned by the platform (HTTP status)
        code: u16,
        /// Description returned by the platform
        description: String,
    },
}

impl TelegramError {
    /// Whether the platform refused this specific payload
    ///
    /// Rejected payloads are abandoned instead of retried so a broken image or an oversized
    /// message cannot block the queue.
    pub fn is_rejected(&self) -> bool {
        matches!(self, TelegramError::BadRequest { .. })
    }
}

impl Error {
    /// Build a configuration error for the given key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

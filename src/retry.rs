//! Retry logic driven by an explicit [`RetryPolicy`]
//!
//! Transient failures are retried with a configurable backoff. The relay's default policy
//! retries forever with a fixed 5-second delay, tests inject bounded policies with short delays.
//!
//! # Example
//!
//! ```no_run
//! use antidel::retry::{IsRetryable, with_retry};
//! use antidel::config::RetryPolicy;
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let policy = RetryPolicy::bounded(3, Duration::from_secs(1));
//! with_retry(&policy, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryPolicy;
use crate::error::{Error, TelegramError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets, short reads) should return `true`.
/// Permanent failures (rejected payloads, bad URLs, bad credentials) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;

    /// Minimum wait the remote side asked for before the next attempt
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Any transport-level failure is worth another attempt
            Error::Network(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            Error::Download(e) => {
                use crate::error::DownloadError;
                // A bad URL never becomes good; everything else may clear up
                !matches!(e, DownloadError::InvalidUrl { .. })
            }
            Error::Telegram(e) => match e {
                TelegramError::TimedOut { .. } | TelegramError::RateLimited { .. } => true,
                TelegramError::Api { code, .. } => *code >= 500,
                TelegramError::BadRequest { .. } => false,
            },
            Error::Feed(e) => {
                use crate::error::FeedError;
                match e {
                    FeedError::Status { status, .. } | FeedError::VideoStatus { status, .. } => {
                        *status >= 500 || *status == 429
                    }
                    FeedError::Malformed { .. } | FeedError::VideoUnavailable { .. } => false,
                }
            }
            Error::Config { .. } => false,
            Error::Serialization(_) => false,
            Error::ShuttingDown => false,
            Error::Other(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Telegram(TelegramError::RateLimited {
                retry_after: Some(secs),
                ..
            }) => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// Execute an async operation, retrying transient failures according to `policy`
///
/// # Returns
///
/// Returns the successful result, the first non-retryable error, or the last error once the
/// policy's attempt budget is spent. With an unlimited policy only success or a permanent
/// error ends the loop.
pub async fn with_retry<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt: u32 = 0;
    let mut delay = policy.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && policy.allows(attempt) => {
                attempt = attempt.saturating_add(1);

                let mut wait = if policy.jitter { add_jitter(delay) } else { delay };
                if let Some(hint) = e.retry_after() {
                    wait = wait.max(hint);
                }

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = ?policy.max_attempts,
                    delay_ms = wait.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(wait).await;

                let next_delay =
                    Duration::try_from_secs_f64(delay.as_secs_f64() * policy.backoff_multiplier)
                        .unwrap_or(policy.max_delay);
                delay = next_delay.min(policy.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

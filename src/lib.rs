//! # antidel
//!
//! Mirrors new posts from social-feed topics into a Telegram channel, so their text and media
//! survive if the author deletes them.
//!
//! ## Pipeline
//!
//! - The [`Poller`](poller::Poller) queries every topic once a minute and keeps a per-topic
//!   [`Watermark`](types::Watermark): the creation time of the newest post seen. Only posts
//!   newer than the watermark are queued, oldest first. The backlog present at startup is never
//!   replayed.
//! - The notification [`queue`] decouples polling from delivery.
//! - The [`Deliverer`](deliverer::Deliverer) downloads pictures into the local
//!   [`AssetCache`](cache::AssetCache) and sends each post as media, location and text.
//!
//! ## Quick Start
//!
//! ```no_run
//! use antidel::{Config, Relay, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.telegram.bot_token = "123456:token".to_string();
//!     config.telegram.chat_id = "@my_mirror".to_string();
//!
//!     let relay = Relay::new(config).await?;
//!
//!     let mut events = relay.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     relay.start().await?;
//!     run_with_shutdown(relay).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Local media store
pub mod cache;
/// Configuration types
pub mod config;
/// Queue consumer sending posts to Telegram
pub mod deliverer;
/// Error types
pub mod error;
/// Feed API client
pub mod feed;
/// Asset downloads
pub mod media;
/// Watermark-based feed polling
pub mod poller;
/// Notification queue
pub mod queue;
/// Relay assembly and lifecycle
pub mod relay;
/// Retry logic with configurable backoff
pub mod retry;
/// Telegram Bot API client
pub mod telegram;
/// Core types and events
pub mod types;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::{Config, RetryPolicy, TopicConfig};
pub use error::{DownloadError, Error, FeedError, Result, TelegramError};
pub use relay::Relay;
pub use telegram::{MessageSink, TelegramClient};
pub use types::{Event, Post, SendKind, Watermark};

/// Run the relay until a termination signal arrives, then shut it down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(relay: Relay) -> Result<()> {
    wait_for_signal().await;
    relay.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                _ = sigint.recv() => tracing::info!("Received SIGINT"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}

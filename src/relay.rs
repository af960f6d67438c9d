//! Top-level relay: wires the poller and the deliverer together and owns their tasks.

use crate::cache::AssetCache;
use crate::config::Config;
use crate::deliverer::Deliverer;
use crate::error::{Error, Result};
use crate::feed::{FeedClient, FeedSource};
use crate::media::{AssetFetcher, MediaDownloader};
use crate::poller::Poller;
use crate::queue::{self, QueueReceiver, QueueSender};
use crate::telegram::{MessageSink, TelegramClient};
use crate::types::Event;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long `shutdown` waits for each task to wind down
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Components built but not yet running
struct Parts {
    poller: Poller,
    deliverer: Deliverer,
    queue_rx: QueueReceiver,
}

/// The running relay
///
/// Two long-lived tasks make up the relay: the [`Poller`] loop producing queue items and the
/// [`Deliverer`] loop consuming them. Both stop when [`Relay::shutdown`] is called.
pub struct Relay {
    event_tx: broadcast::Sender<Event>,
    queue_tx: QueueSender,
    cancel: CancellationToken,
    parts: Mutex<Option<Parts>>,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Relay {
    /// Build a relay talking to the real feed, asset hosts and Telegram
    ///
    /// Validates the configuration and creates the media directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the media directory cannot be created,
    /// or an HTTP client cannot be built.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.media.dir)
            .await
            .map_err(|e| Error::Config {
                message: format!(
                    "cannot create media directory {}: {}",
                    config.media.dir.display(),
                    e
                ),
                key: Some("media.dir".to_string()),
            })?;

        let feed = Arc::new(FeedClient::new(&config.feed)?);
        let fetcher = Arc::new(MediaDownloader::new(
            AssetCache::new(&config.media.dir),
            config.download.retry.clone(),
        )?);
        let sink = Arc::new(TelegramClient::new(&config.telegram)?);

        tracing::info!(
            topics = config.feed.topics.len(),
            media_dir = %config.media.dir.display(),
            "Relay configured"
        );

        Ok(Self::with_components(&config, feed, fetcher, sink))
    }

    /// Build a relay around caller-supplied collaborators
    pub fn with_components(
        config: &Config,
        feed: Arc<dyn FeedSource>,
        fetcher: Arc<dyn AssetFetcher>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(1000);
        let (queue_tx, queue_rx) = queue::channel();

        let poller = Poller::new(&config.feed, feed.clone(), queue_tx.clone(), event_tx.clone());
        let deliverer = Deliverer::new(
            sink,
            fetcher,
            feed,
            config.delivery.clone(),
            event_tx.clone(),
        );

        Self {
            event_tx,
            queue_tx,
            cancel: CancellationToken::new(),
            parts: Mutex::new(Some(Parts {
                poller,
                deliverer,
                queue_rx,
            })),
            tasks: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Spawn the poller and deliverer tasks
    ///
    /// # Errors
    ///
    /// Returns an error if the relay was already started.
    pub async fn start(&self) -> Result<()> {
        let parts = self
            .parts
            .lock()
            .map_err(|_| Error::Other("relay state poisoned".to_string()))?
            .take()
            .ok_or_else(|| Error::Other("relay already started".to_string()))?;

        let Parts {
            poller,
            deliverer,
            queue_rx,
        } = parts;

        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(poller.run(self.cancel.clone())));
        tasks.push(tokio::spawn(deliverer.run(queue_rx, self.cancel.clone())));

        tracing::info!("Relay started");
        Ok(())
    }

    /// Subscribe to pipeline events
    ///
    /// Events emitted before the call are not replayed; subscribe before [`Relay::start`] to
    /// observe the first cycle.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Number of posts queued but not yet taken by the deliverer
    pub fn pending(&self) -> usize {
        self.queue_tx.pending()
    }

    /// Stop both loops and wait for their tasks
    ///
    /// Queued posts that were not delivered yet are dropped.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating shutdown");
        self.cancel.cancel();

        let handles: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for handle in handles {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Relay task ended abnormally"),
                Err(_) => tracing::warn!("Timeout waiting for relay task to stop"),
            }
        }

        let dropped = self.pending();
        if dropped > 0 {
            tracing::warn!(dropped, "Undelivered posts dropped at shutdown");
        }
        tracing::info!("Shutdown complete");
        Ok(())
    }
}

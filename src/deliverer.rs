//! Queue consumer that turns posts into Telegram messages
//!
//! One post becomes, in order:
//! 1. its pictures: a photo (or a document for a single GIF), or media groups of up to ten,
//! 2. a location pin if the post has one,
//! 3. one text message carrying the author, time, content and every URL.
//!
//! Each send operation is retried through the delivery [`RetryPolicy`] while it fails with a
//! transient error. A rejected payload abandons only that operation; the rest of the post is
//! still sent. A panic while handling a post is contained to that post.
//!
//! [`RetryPolicy`]: crate::config::RetryPolicy

use crate::config::DeliveryConfig;
use crate::error::{Error, Result};
use crate::feed::FeedSource;
use crate::media::AssetFetcher;
use crate::queue::{QueueItem, QueueReceiver};
use crate::retry::with_retry;
use crate::telegram::MessageSink;
use crate::types::{Event, Post, SendKind};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Largest number of pictures the platform accepts in one media group
pub const MEDIA_GROUP_LIMIT: usize = 10;

/// Placeholder used when a post's video URL cannot be resolved
pub const VIDEO_UNAVAILABLE: &str = "(unavailable)";

/// Compose the text message for a post
///
/// `video_url` is only consulted when the post carries a video; `None` then renders the
/// [`VIDEO_UNAVAILABLE`] placeholder.
pub fn compose_text(post: &Post, video_url: Option<&str>) -> String {
    let mut text = format!(
        "{}\n{}\n\n{}\n",
        post.user.screen_name,
        post.created_at_display(),
        post.content
    );

    match post.pictures.as_slice() {
        [] => {}
        [single] => {
            text.push_str("\nPhoto:\n");
            text.push_str(&single.pic_url);
        }
        several => {
            text.push_str("\nPhotos:");
            for picture in several {
                text.push('\n');
                text.push_str(&picture.pic_url);
            }
        }
    }

    if let Some(link) = post.link_url() {
        text.push_str("\nLink: ");
        text.push_str(link);
    }

    if post.has_video() {
        text.push_str("\nVideo: ");
        text.push_str(video_url.unwrap_or(VIDEO_UNAVAILABLE));
    }

    text
}

fn is_animated(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gif"))
}

/// Outcome of delivering one post
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Send operations that went through
    pub sent: Vec<SendKind>,
    /// Send operations that were given up
    pub abandoned: Vec<SendKind>,
}

/// Enforces the pause between two sends of the same post
struct Pacer {
    spacing: Duration,
    first: bool,
}

impl Pacer {
    fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            first: true,
        }
    }

    async fn wait(&mut self) {
        if !std::mem::replace(&mut self.first, false) && !self.spacing.is_zero() {
            sleep(self.spacing).await;
        }
    }
}

/// Single consumer of the notification queue
pub struct Deliverer {
    sink: Arc<dyn MessageSink>,
    fetcher: Arc<dyn AssetFetcher>,
    feed: Arc<dyn FeedSource>,
    config: DeliveryConfig,
    event_tx: broadcast::Sender<Event>,
}

impl Deliverer {
    /// Create a deliverer
    pub fn new(
        sink: Arc<dyn MessageSink>,
        fetcher: Arc<dyn AssetFetcher>,
        feed: Arc<dyn FeedSource>,
        config: DeliveryConfig,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            sink,
            fetcher,
            feed,
            config,
            event_tx,
        }
    }

    /// Send every message for one post
    pub async fn deliver(&self, item: &QueueItem) -> DeliveryReport {
        let post = &item.post;
        let mut report = DeliveryReport::default();
        let mut pacer = Pacer::new(self.config.send_spacing);

        debug!(topic = %item.topic, post_id = %post.id, "Delivering post");

        let urls: Vec<&str> = post.picture_urls().collect();
        match urls.as_slice() {
            [] => {}
            [url] => {
                pacer.wait().await;
                self.send_single_picture(post, url, &mut report).await;
            }
            several => {
                for chunk in several.chunks(MEDIA_GROUP_LIMIT) {
                    pacer.wait().await;
                    self.send_picture_chunk(post, chunk, &mut report).await;
                }
            }
        }

        if let Some(location) = post.location() {
            pacer.wait().await;
            let outcome = self
                .attempt(post, SendKind::Location, || self.sink.send_location(location))
                .await;
            report.record(SendKind::Location, outcome);
        }

        let video_url = if post.has_video() {
            match self.feed.resolve_video(&post.id).await {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(post_id = %post.id, error = %e, "Could not resolve video URL");
                    None
                }
            }
        } else {
            None
        };

        let text = compose_text(post, video_url.as_deref());
        let link_preview = post.link_url().is_some();
        pacer.wait().await;
        let outcome = self
            .attempt(post, SendKind::Text, || {
                self.sink.send_text(&text, link_preview)
            })
            .await;
        report.record(SendKind::Text, outcome);

        self.event_tx
            .send(Event::PostDelivered {
                post_id: post.id.clone(),
            })
            .ok();

        report
    }

    async fn send_single_picture(&self, post: &Post, url: &str, report: &mut DeliveryReport) {
        let path = match self.fetcher.fetch(url).await {
            Ok(path) => path,
            Err(e) => {
                self.abandon(post, SendKind::Photo, &e);
                report.abandoned.push(SendKind::Photo);
                return;
            }
        };

        let (kind, outcome) = if is_animated(&path) {
            let outcome = self
                .attempt(post, SendKind::Document, || self.sink.send_document(&path))
                .await;
            (SendKind::Document, outcome)
        } else {
            let outcome = self
                .attempt(post, SendKind::Photo, || self.sink.send_photo(&path))
                .await;
            (SendKind::Photo, outcome)
        };
        report.record(kind, outcome);
    }

    async fn send_picture_chunk(&self, post: &Post, urls: &[&str], report: &mut DeliveryReport) {
        let mut paths: Vec<PathBuf> = Vec::with_capacity(urls.len());
        for url in urls {
            match self.fetcher.fetch(url).await {
                Ok(path) => paths.push(path),
                Err(e) => {
                    self.abandon(post, SendKind::MediaGroup, &e);
                    report.abandoned.push(SendKind::MediaGroup);
                    return;
                }
            }
        }

        // A trailing chunk of one picture cannot form a group
        let outcome = if let [path] = paths.as_slice() {
            self.attempt(post, SendKind::MediaGroup, || self.sink.send_photo(path))
                .await
        } else {
            let refs: Vec<&Path> = paths.iter().map(PathBuf::as_path).collect();
            self.attempt(post, SendKind::MediaGroup, || {
                self.sink.send_media_group(&refs)
            })
            .await
        };
        report.record(SendKind::MediaGroup, outcome);
    }

    /// Run one send operation under the retry policy; `false` if it was abandoned
    async fn attempt<F, Fut>(&self, post: &Post, kind: SendKind, operation: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        match with_retry(&self.config.retry, operation).await {
            Ok(()) => true,
            Err(e) => {
                self.abandon(post, kind, &e);
                false
            }
        }
    }

    fn abandon(&self, post: &Post, kind: SendKind, error: &Error) {
        warn!(
            post_id = %post.id,
            kind = kind.as_str(),
            error = %error,
            "Send abandoned"
        );
        self.event_tx
            .send(Event::SendAbandoned {
                post_id: post.id.clone(),
                kind,
                reason: error.to_string(),
            })
            .ok();
    }

    /// Deliver one post, containing any panic to this post
    async fn handle(&self, item: QueueItem) {
        let post_id = item.post.id.clone();
        match AssertUnwindSafe(self.deliver(&item)).catch_unwind().await {
            Ok(report) if report.abandoned.is_empty() => {
                info!(post_id = %post_id, sends = report.sent.len(), "Post delivered");
            }
            Ok(report) => {
                warn!(
                    post_id = %post_id,
                    sent = report.sent.len(),
                    abandoned = report.abandoned.len(),
                    "Post delivered with abandoned sends"
                );
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(post_id = %post_id, error = %message, "Delivery panicked, moving on");
                self.event_tx
                    .send(Event::ItemFailed {
                        post_id,
                        error: message,
                    })
                    .ok();
            }
        }
    }

    /// Consume the queue until `cancel` fires or every producer is gone
    ///
    /// Waits `item_spacing` before taking each item. Posts are handled one at a time.
    pub async fn run(self, mut queue: QueueReceiver, cancel: CancellationToken) {
        info!("Deliverer started");

        loop {
            if !self.config.item_spacing.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = sleep(self.config.item_spacing) => {}
                }
            }

            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                item = queue.next() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Shutdown interrupted an in-flight delivery");
                    break;
                }
                _ = self.handle(item) => {}
            }
        }

        info!(pending = queue.pending(), "Deliverer stopped");
    }
}

impl DeliveryReport {
    fn record(&mut self, kind: SendKind, sent: bool) {
        if sent {
            self.sent.push(kind);
        } else {
            self.abandoned.push(kind);
        }
    }
}

//! Notification queue between the poller and the deliverer
//!
//! An unbounded FIFO: the poller never waits on delivery, and the single consumer awaits when
//! the queue is empty. Items come out in exactly the order they went in.

use crate::error::{Error, Result};
use crate::types::Post;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// A post awaiting delivery
#[derive(Clone, Debug)]
pub struct QueueItem {
    /// Label of the topic the post came from
    pub topic: String,
    /// The post itself
    pub post: Post,
    /// When the poller queued it
    pub enqueued_at: DateTime<Utc>,
}

/// Create a connected sender/receiver pair
pub fn channel() -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        QueueSender {
            tx,
            depth: depth.clone(),
        },
        QueueReceiver { rx, depth },
    )
}

/// Producer half of the notification queue
#[derive(Clone, Debug)]
pub struct QueueSender {
    tx: mpsc::UnboundedSender<QueueItem>,
    depth: Arc<AtomicUsize>,
}

impl QueueSender {
    /// Append one post
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] once the consumer has gone away.
    pub fn push(&self, topic: &str, post: Post) -> Result<()> {
        let item = QueueItem {
            topic: topic.to_string(),
            post,
            enqueued_at: Utc::now(),
        };
        self.depth.fetch_add(1, Ordering::SeqCst);
        self.tx.send(item).map_err(|_| {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            Error::ShuttingDown
        })
    }

    /// Number of items waiting for the consumer
    pub fn pending(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

/// Consumer half of the notification queue
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::UnboundedReceiver<QueueItem>,
    depth: Arc<AtomicUsize>,
}

impl QueueReceiver {
    /// Wait for the next item; `None` once every sender is gone and the queue is drained
    pub async fn next(&mut self) -> Option<QueueItem> {
        let item = self.rx.recv().await;
        if item.is_some() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        item
    }

    /// Take the next item without waiting
    pub fn try_next(&mut self) -> Option<QueueItem> {
        let item = self.rx.try_recv().ok();
        if item.is_some() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        item
    }

    /// Number of items waiting
    pub fn pending(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

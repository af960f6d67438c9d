//! Incremental feed polling
//!
//! Every cycle fetches the newest posts of each configured topic and decides which of them are
//! new by comparing creation times against the topic's [`Watermark`].
//!
//! # Phases
//!
//! - **Cold start**: the first cycle only primes the watermarks (newest post per topic), so the
//!   backlog that existed before the relay started is never replayed.
//! - **Steady state**: posts newer than the watermark are queued, oldest first, and the
//!   watermark moves to the newest post of the response.
//!
//! A cycle in which any topic request fails changes nothing and is simply retried by the next
//! cycle.

use crate::config::{FeedConfig, TopicConfig};
use crate::feed::FeedSource;
use crate::queue::QueueSender;
use crate::types::{Event, Post, Watermark};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Poller phase
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No cycle has completed yet
    ColdStart,
    /// Watermarks are primed; new posts are queued
    Steady,
}

/// What a single poll cycle did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Cold-start cycle: watermarks primed, nothing queued
    Primed,
    /// Steady-state cycle: this many posts were queued
    Queued(usize),
    /// A topic request failed; the cycle changed nothing
    Skipped(String),
}

/// Watermark state of one topic
#[derive(Clone, Debug)]
pub struct TopicTracker {
    topic: TopicConfig,
    watermark: Watermark,
}

impl TopicTracker {
    /// Tracker with the watermark at the epoch
    pub fn new(topic: TopicConfig) -> Self {
        Self {
            topic,
            watermark: Watermark::default(),
        }
    }

    /// Topic this tracker follows
    pub fn topic(&self) -> &TopicConfig {
        &self.topic
    }

    /// Current watermark
    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    /// Cold-start handling: adopt the newest post's time without queueing anything
    ///
    /// Responses with one post or fewer are ambiguous and leave the watermark alone.
    /// Returns whether the watermark moved.
    pub fn prime(&mut self, posts: &[Post]) -> bool {
        if posts.len() <= 1 {
            return false;
        }
        self.advance_to(Watermark::of(&posts[0]))
    }

    /// Steady-state handling: return the posts newer than the watermark, oldest first
    ///
    /// `posts` must be newest first. The scan stops at the first post by someone other than
    /// `admin_username` that the watermark already covers; admin posts are dropped but never
    /// end the scan. Afterwards the watermark moves to the first post of the response.
    /// Responses with one post or fewer are ignored.
    pub fn observe(&mut self, posts: Vec<Post>, admin_username: &str) -> Vec<Post> {
        if posts.len() <= 1 {
            return Vec::new();
        }

        let newest = Watermark::of(&posts[0]);
        let mut fresh = Vec::new();
        for post in posts {
            let is_admin = post.is_from(admin_username);
            if !is_admin && self.watermark.covers(&post) {
                break;
            }
            if !is_admin {
                fresh.push(post);
            }
        }

        self.advance_to(newest);
        fresh.reverse();
        fresh
    }

    fn advance_to(&mut self, candidate: Watermark) -> bool {
        if candidate > self.watermark {
            self.watermark = candidate;
            true
        } else {
            false
        }
    }
}

/// Fixed-cadence poller feeding the notification queue
pub struct Poller {
    source: Arc<dyn FeedSource>,
    queue: QueueSender,
    event_tx: broadcast::Sender<Event>,
    trackers: Vec<TopicTracker>,
    phase: Phase,
    admin_username: String,
    poll_interval: Duration,
    topic_spacing: Duration,
}

impl Poller {
    /// Create a poller in the cold-start phase
    pub fn new(
        config: &FeedConfig,
        source: Arc<dyn FeedSource>,
        queue: QueueSender,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            source,
            queue,
            event_tx,
            trackers: config.topics.iter().cloned().map(TopicTracker::new).collect(),
            phase: Phase::ColdStart,
            admin_username: config.admin_username.clone(),
            poll_interval: config.poll_interval,
            topic_spacing: config.topic_spacing,
        }
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Watermark of the topic with id `topic_id`
    pub fn watermark(&self, topic_id: &str) -> Option<Watermark> {
        self.trackers
            .iter()
            .find(|t| t.topic.id == topic_id)
            .map(TopicTracker::watermark)
    }

    /// Run one poll cycle
    ///
    /// Topics are requested one after another with `topic_spacing` in between. If any request
    /// fails the cycle is abandoned before touching any watermark.
    pub async fn poll_once(&mut self) -> CycleOutcome {
        let mut pages = Vec::with_capacity(self.trackers.len());

        for (index, tracker) in self.trackers.iter().enumerate() {
            if index > 0 && !self.topic_spacing.is_zero() {
                sleep(self.topic_spacing).await;
            }

            match self.source.fetch_topic(&tracker.topic).await {
                Ok(posts) => pages.push(posts),
                Err(e) => {
                    let reason = format!("topic {}: {}", tracker.topic.name, e);
                    warn!(topic = %tracker.topic.name, error = %e, "Feed request failed, skipping cycle");
                    self.event_tx
                        .send(Event::CycleSkipped {
                            reason: reason.clone(),
                        })
                        .ok();
                    return CycleOutcome::Skipped(reason);
                }
            }
        }

        match self.phase {
            Phase::ColdStart => {
                for (tracker, posts) in self.trackers.iter_mut().zip(&pages) {
                    if tracker.prime(posts) {
                        info!(
                            topic = %tracker.topic.name,
                            watermark = %tracker.watermark,
                            backlog = posts.len(),
                            "Watermark primed, backlog skipped"
                        );
                        self.event_tx
                            .send(Event::WatermarkAdvanced {
                                topic: tracker.topic.name.clone(),
                                watermark: tracker.watermark.as_secs_f64(),
                            })
                            .ok();
                    }
                }
                self.phase = Phase::Steady;
                CycleOutcome::Primed
            }
            Phase::Steady => {
                let mut queued = 0;
                for (tracker, posts) in self.trackers.iter_mut().zip(pages) {
                    let before = tracker.watermark;
                    let fresh = tracker.observe(posts, &self.admin_username);

                    for post in fresh {
                        let post_id = post.id.clone();
                        if let Err(e) = self.queue.push(&tracker.topic.name, post) {
                            warn!(post_id = %post_id, error = %e, "Could not queue post");
                            continue;
                        }
                        debug!(topic = %tracker.topic.name, post_id = %post_id, "Post queued");
                        self.event_tx
                            .send(Event::PostQueued {
                                topic: tracker.topic.name.clone(),
                                post_id,
                            })
                            .ok();
                        queued += 1;
                    }

                    if tracker.watermark != before {
                        self.event_tx
                            .send(Event::WatermarkAdvanced {
                                topic: tracker.topic.name.clone(),
                                watermark: tracker.watermark.as_secs_f64(),
                            })
                            .ok();
                    }
                }

                if queued > 0 {
                    info!(count = queued, "Queued new posts");
                }
                CycleOutcome::Queued(queued)
            }
        }
    }

    /// Poll until `cancel` fires
    ///
    /// Cycles start every `poll_interval`, measured start to start. A cycle that overruns the
    /// interval is followed immediately by the next one.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            topics = self.trackers.len(),
            interval_secs = self.poll_interval.as_secs(),
            "Poller started"
        );

        loop {
            let started = Instant::now();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.poll_once() => {
                    debug!(?outcome, elapsed_ms = started.elapsed().as_millis(), "Poll cycle finished");
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep_until(started + self.poll_interval) => {}
            }
        }

        info!("Poller stopped");
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

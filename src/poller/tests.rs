use super::*;
use crate::queue::{self, QueueReceiver};
use crate::test_helpers::{BASE_SECS, ScriptedFeed, post_at, topic};
use chrono::DateTime;

const ADMIN: &str = "forumadmin";

fn feed_config(topics: Vec<TopicConfig>) -> FeedConfig {
    FeedConfig {
        topics,
        poll_interval: Duration::from_millis(40),
        topic_spacing: Duration::ZERO,
        ..Default::default()
    }
}

struct Harness {
    poller: Poller,
    feed: Arc<ScriptedFeed>,
    queue: QueueReceiver,
    events: broadcast::Receiver<Event>,
}

fn harness(topics: Vec<TopicConfig>) -> Harness {
    let feed = Arc::new(ScriptedFeed::new());
    let (tx, rx) = queue::channel();
    let (event_tx, events) = broadcast::channel(64);
    let poller = Poller::new(&feed_config(topics), feed.clone(), tx, event_tx);
    Harness {
        poller,
        feed,
        queue: rx,
        events,
    }
}

fn drain(rx: &mut QueueReceiver) -> Vec<String> {
    let mut ids = Vec::new();
    while let Some(item) = rx.try_next() {
        ids.push(item.post.id);
    }
    ids
}

fn mark(offset: i64) -> Watermark {
    Watermark::at(DateTime::from_timestamp(BASE_SECS + offset, 0).unwrap())
}

fn tracker_at(offset: i64) -> TopicTracker {
    let mut tracker = TopicTracker::new(topic("del"));
    tracker.watermark = mark(offset);
    tracker
}

fn ids(posts: &[Post]) -> Vec<&str> {
    posts.iter().map(|p| p.id.as_str()).collect()
}

#[test]
fn delta_is_everything_newer_than_watermark() {
    let mut tracker = tracker_at(0);
    let fresh = tracker.observe(
        vec![
            post_at("p3", "u", 3),
            post_at("p2", "u", 2),
            post_at("p1", "u", 1),
            post_at("p0", "u", -1),
        ],
        ADMIN,
    );

    assert_eq!(ids(&fresh), vec!["p1", "p2", "p3"], "oldest first");
    assert_eq!(tracker.watermark(), mark(3));
}

#[test]
fn post_at_watermark_is_not_new() {
    let mut tracker = tracker_at(5);
    let fresh = tracker.observe(
        vec![post_at("p6", "u", 6), post_at("p5", "u", 5), post_at("p7", "u", 7)],
        ADMIN,
    );
    // The scan stops at p5 and never looks further down
    assert_eq!(ids(&fresh), vec!["p6"]);
}

#[test]
fn admin_posts_are_skipped_without_ending_the_scan() {
    let mut tracker = tracker_at(0);
    let fresh = tracker.observe(
        vec![
            post_at("p3", "u", 3),
            post_at("pinned", ADMIN, -100),
            post_at("p1", "u", 1),
            post_at("old", "u", -1),
        ],
        ADMIN,
    );

    assert_eq!(ids(&fresh), vec!["p1", "p3"]);
}

#[test]
fn admin_post_at_top_still_moves_watermark() {
    let mut tracker = tracker_at(0);
    let fresh = tracker.observe(
        vec![post_at("notice", ADMIN, 9), post_at("p1", "u", 1)],
        ADMIN,
    );

    assert_eq!(ids(&fresh), vec!["p1"]);
    assert_eq!(tracker.watermark(), mark(9));
}

#[test]
fn single_post_response_changes_nothing() {
    let mut tracker = tracker_at(0);
    assert!(tracker.observe(vec![post_at("p9", "u", 9)], ADMIN).is_empty());
    assert!(tracker.observe(vec![], ADMIN).is_empty());
    assert_eq!(tracker.watermark(), mark(0));
}

#[test]
fn watermark_never_moves_backwards() {
    let mut tracker = tracker_at(10);
    // Newest post was deleted upstream, so the head of the list is older than the watermark
    let fresh = tracker.observe(vec![post_at("p8", "u", 8), post_at("p7", "u", 7)], ADMIN);

    assert!(fresh.is_empty());
    assert_eq!(tracker.watermark(), mark(10));
}

#[test]
fn prime_needs_more_than_one_post() {
    let mut tracker = TopicTracker::new(topic("del"));
    assert!(!tracker.prime(&[post_at("only", "u", 5)]));
    assert_eq!(tracker.watermark(), Watermark::default());

    assert!(tracker.prime(&[post_at("b", "u", 5), post_at("a", "u", 4)]));
    assert_eq!(tracker.watermark(), mark(5));
}

#[tokio::test]
async fn cold_start_suppresses_backlog() {
    let del = topic("del");
    let night = topic("night");
    let mut h = harness(vec![del.clone(), night.clone()]);

    h.feed
        .push_page(&del, vec![post_at("d2", "u", 20), post_at("d1", "u", 10)]);
    h.feed
        .push_page(&night, vec![post_at("n2", "u", 25), post_at("n1", "u", 15)]);

    assert_eq!(h.poller.poll_once().await, CycleOutcome::Primed);
    assert_eq!(h.poller.phase(), Phase::Steady);
    assert!(drain(&mut h.queue).is_empty());
    assert_eq!(h.poller.watermark(&del.id), Some(mark(20)));
    assert_eq!(h.poller.watermark(&night.id), Some(mark(25)));
}

#[tokio::test]
async fn steady_cycle_queues_new_posts_per_topic_in_order() {
    let del = topic("del");
    let night = topic("night");
    let mut h = harness(vec![del.clone(), night.clone()]);

    h.feed
        .push_page(&del, vec![post_at("d2", "u", 20), post_at("d1", "u", 10)]);
    h.feed
        .push_page(&night, vec![post_at("n2", "u", 25), post_at("n1", "u", 15)]);
    h.poller.poll_once().await;

    h.feed.push_page(
        &del,
        vec![
            post_at("d4", "u", 40),
            post_at("d3", "u", 30),
            post_at("d2", "u", 20),
        ],
    );
    h.feed
        .push_page(&night, vec![post_at("n3", "u", 35), post_at("n2", "u", 25)]);

    assert_eq!(h.poller.poll_once().await, CycleOutcome::Queued(3));
    assert_eq!(drain(&mut h.queue), vec!["d3", "d4", "n3"]);
    assert_eq!(h.poller.watermark(&del.id), Some(mark(40)));
    assert_eq!(h.poller.watermark(&night.id), Some(mark(35)));
}

#[tokio::test]
async fn failed_topic_skips_whole_cycle() {
    let del = topic("del");
    let night = topic("night");
    let mut h = harness(vec![del.clone(), night.clone()]);

    h.feed
        .push_page(&del, vec![post_at("d2", "u", 20), post_at("d1", "u", 10)]);
    h.feed
        .push_page(&night, vec![post_at("n2", "u", 25), post_at("n1", "u", 15)]);
    h.poller.poll_once().await;

    h.feed
        .push_page(&del, vec![post_at("d3", "u", 30), post_at("d2", "u", 20)]);
    h.feed.push_failure(&night, 503);

    assert!(matches!(
        h.poller.poll_once().await,
        CycleOutcome::Skipped(_)
    ));
    assert!(drain(&mut h.queue).is_empty());
    assert_eq!(h.poller.watermark(&del.id), Some(mark(20)));
}

#[tokio::test]
async fn failed_first_cycle_stays_in_cold_start() {
    let del = topic("del");
    let night = topic("night");
    let mut h = harness(vec![del.clone(), night.clone()]);

    h.feed
        .push_page(&del, vec![post_at("d2", "u", 20), post_at("d1", "u", 10)]);
    h.feed.push_failure(&night, 500);
    h.poller.poll_once().await;
    assert_eq!(h.poller.phase(), Phase::ColdStart);
    assert_eq!(h.poller.watermark(&del.id), Some(Watermark::default()));

    // The retry cycle primes instead of replaying the backlog
    h.feed
        .push_page(&del, vec![post_at("d2", "u", 20), post_at("d1", "u", 10)]);
    h.feed
        .push_page(&night, vec![post_at("n2", "u", 25), post_at("n1", "u", 15)]);
    assert_eq!(h.poller.poll_once().await, CycleOutcome::Primed);
    assert!(drain(&mut h.queue).is_empty());
}

#[tokio::test]
async fn first_failure_stops_further_topic_requests() {
    let del = topic("del");
    let night = topic("night");
    let mut h = harness(vec![del.clone(), night.clone()]);

    h.feed.push_failure(&del, 502);
    h.poller.poll_once().await;
    assert_eq!(h.feed.calls(), 1);
}

#[tokio::test]
async fn events_report_queue_and_watermark() {
    let del = topic("del");
    let mut h = harness(vec![del.clone()]);

    h.feed
        .push_page(&del, vec![post_at("d2", "u", 20), post_at("d1", "u", 10)]);
    h.poller.poll_once().await;
    h.feed
        .push_page(&del, vec![post_at("d3", "u", 30), post_at("d2", "u", 20)]);
    h.poller.poll_once().await;

    let mut events = Vec::new();
    while let Ok(event) = h.events.try_recv() {
        events.push(event);
    }

    assert_eq!(
        events,
        vec![
            Event::WatermarkAdvanced {
                topic: "del".to_string(),
                watermark: mark(20).as_secs_f64(),
            },
            Event::PostQueued {
                topic: "del".to_string(),
                post_id: "d3".to_string(),
            },
            Event::WatermarkAdvanced {
                topic: "del".to_string(),
                watermark: mark(30).as_secs_f64(),
            },
        ]
    );
}

#[tokio::test]
async fn run_keeps_cadence_until_cancelled() {
    let del = topic("del");
    let h = harness(vec![del]);
    let feed = h.feed.clone();
    let cancel = CancellationToken::new();

    let task = tokio::spawn(h.poller.run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(150)).await;
    cancel.cancel();
    task.await.unwrap();

    // 40ms cadence over ~150ms: cycles at 0, 40, 80, 120
    let calls = feed.calls();
    assert!((3..=5).contains(&calls), "unexpected cycle count {calls}");
}

//! Event-driven waits for integration tests

use antidel::Event;
use std::time::Duration;
use tokio::sync::broadcast;

/// Result of waiting for a post to be delivered
#[derive(Debug, PartialEq)]
pub enum WaitResult {
    /// `PostDelivered` was seen
    Delivered,
    /// The item failed instead
    Failed(String),
    /// Timeout waiting for the post
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait until `post_id` has been delivered or has failed
pub async fn wait_for_delivery(
    events: &mut broadcast::Receiver<Event>,
    post_id: &str,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::PostDelivered { post_id: id }) if id == post_id => {
                    return WaitResult::Delivered;
                }
                Ok(Event::ItemFailed { post_id: id, error }) if id == post_id => {
                    return WaitResult::Failed(error);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Collect every event already buffered in `events`
pub fn drain(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

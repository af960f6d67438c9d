//! Test configuration pointing every endpoint at one mock server

use antidel::{Config, RetryPolicy, TopicConfig};
use std::path::Path;
use std::time::Duration;
use wiremock::MockServer;

/// Bot token used by test configurations
pub const TEST_TOKEN: &str = "42:test-token";

/// Topic polled by test configurations
pub fn test_topic() -> TopicConfig {
    TopicConfig {
        id: "topic-del".to_string(),
        name: "del".to_string(),
    }
}

/// Relay configuration with fast cadence and bounded retries
///
/// Feed, video lookup and Bot API all live on `server`; assets are cached under `media_dir`.
pub fn relay_config(server: &MockServer, media_dir: &Path) -> Config {
    let mut config = Config::default();

    config.feed.list_url = format!("{}/1.0/squarePosts/list", server.uri());
    config.feed.video_url = format!("{}/1.0/mediaMeta/play", server.uri());
    config.feed.topics = vec![test_topic()];
    config.feed.poll_interval = Duration::from_millis(100);
    config.feed.topic_spacing = Duration::ZERO;
    config.feed.video_retry = RetryPolicy::bounded(1, Duration::from_millis(10));

    config.telegram.api_url = server.uri();
    config.telegram.bot_token = TEST_TOKEN.to_string();
    config.telegram.chat_id = "-100200300".to_string();
    config.telegram.request_timeout = Duration::from_secs(5);

    config.media.dir = media_dir.to_path_buf();

    config.delivery.send_spacing = Duration::ZERO;
    config.delivery.item_spacing = Duration::ZERO;
    config.delivery.retry = RetryPolicy::bounded(2, Duration::from_millis(10));
    config.download.retry = RetryPolicy::bounded(2, Duration::from_millis(10));

    config
}

/// Path of a Bot API method on the mock server
pub fn bot_path(method: &str) -> String {
    format!("/bot{}/{}", TEST_TOKEN, method)
}

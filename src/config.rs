//! Configuration types for antidel

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Environment variable naming an optional JSON configuration file
pub const ENV_CONFIG_PATH: &str = "ANTIDEL_CONFIG";
/// Environment variable overriding `telegram.bot_token`
pub const ENV_BOT_TOKEN: &str = "ANTIDEL_BOT_TOKEN";
/// Environment variable overriding `telegram.chat_id`
pub const ENV_CHAT_ID: &str = "ANTIDEL_CHAT_ID";
/// Environment variable overriding `media.dir`
pub const ENV_MEDIA_DIR: &str = "ANTIDEL_MEDIA_DIR";

/// A feed topic polled every cycle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Topic identifier sent as `topicId`
    pub id: String,

    /// Short label used in logs and events
    pub name: String,
}

/// Feed API settings (endpoints, topics, cadence)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Endpoint listing the newest posts of a topic
    #[serde(default = "default_list_url")]
    pub list_url: String,

    /// Endpoint resolving a post's playable video URL
    #[serde(default = "default_video_url")]
    pub video_url: String,

    /// Topics polled each cycle, in request order
    #[serde(default = "default_topics")]
    pub topics: Vec<TopicConfig>,

    /// Number of posts requested per topic (default: 10)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Username of the system account whose posts are never relayed (default: "forumadmin")
    #[serde(default = "default_admin_username")]
    pub admin_username: String,

    /// Target period between the starts of two poll cycles (default: 60 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Pause between two topic requests inside one cycle (default: 5 seconds)
    #[serde(default = "default_topic_spacing", with = "duration_serde")]
    pub topic_spacing: Duration,

    /// Timeout for a single feed request (default: 30 seconds)
    #[serde(default = "default_feed_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Retry policy for video URL lookups
    #[serde(default)]
    pub video_retry: RetryPolicy,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            list_url: default_list_url(),
            video_url: default_video_url(),
            topics: default_topics(),
            page_size: default_page_size(),
            admin_username: default_admin_username(),
            poll_interval: default_poll_interval(),
            topic_spacing: default_topic_spacing(),
            request_timeout: default_feed_timeout(),
            video_retry: RetryPolicy::default(),
        }
    }
}

/// Telegram Bot API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API base URL (default: "https://api.telegram.org")
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,

    /// Bot token issued by BotFather
    #[serde(default)]
    pub bot_token: String,

    /// Destination chat or channel (numeric id or "@channel")
    #[serde(default)]
    pub chat_id: String,

    /// Connect timeout (default: 20 seconds)
    #[serde(default = "default_telegram_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Whole-request timeout (default: 20 seconds)
    #[serde(default = "default_telegram_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_url: default_telegram_api_url(),
            bot_token: String::new(),
            chat_id: String::new(),
            connect_timeout: default_telegram_timeout(),
            request_timeout: default_telegram_timeout(),
        }
    }
}

/// Local media cache settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Directory holding downloaded assets (default: "media")
    #[serde(default = "default_media_dir")]
    pub dir: PathBuf,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            dir: default_media_dir(),
        }
    }
}

/// Delivery pacing and retry settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Pause between two send operations of the same post (default: 1 second)
    #[serde(default = "default_send_spacing", with = "duration_serde")]
    pub send_spacing: Duration,

    /// Pause before handling each dequeued post (default: 5 seconds)
    #[serde(default = "default_item_spacing", with = "duration_serde")]
    pub item_spacing: Duration,

    /// Retry policy for timeout-class send failures
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            send_spacing: default_send_spacing(),
            item_spacing: default_item_spacing(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Asset download settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Retry policy for transient download failures
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Main configuration for the relay
///
/// Fields are organized into sub-configs:
/// - [`feed`](FeedConfig): endpoints, topics, poll cadence
/// - [`telegram`](TelegramConfig): credentials and destination
/// - [`media`](MediaConfig): asset cache location
/// - [`delivery`](DeliveryConfig): send pacing and retry
/// - [`download`](DownloadConfig): asset download retry
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Feed API settings
    #[serde(default)]
    pub feed: FeedConfig,

    /// Telegram Bot API settings
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Media cache settings
    #[serde(default)]
    pub media: MediaConfig,

    /// Delivery settings
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Download settings
    #[serde(default)]
    pub download: DownloadConfig,
}

impl Config {
    /// Load configuration from a JSON file
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load configuration from the process environment
    ///
    /// Reads the JSON file named by `ANTIDEL_CONFIG` (if set), then applies the
    /// `ANTIDEL_BOT_TOKEN`, `ANTIDEL_CHAT_ID` and `ANTIDEL_MEDIA_DIR` overrides.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] but with an injectable variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(ENV_CONFIG_PATH) {
            Some(path) if !path.is_empty() => Self::from_file(path)?,
            _ => Self::default(),
        };

        if let Some(token) = lookup(ENV_BOT_TOKEN) {
            config.telegram.bot_token = token;
        }
        if let Some(chat_id) = lookup(ENV_CHAT_ID) {
            config.telegram.chat_id = chat_id;
        }
        if let Some(dir) = lookup(ENV_MEDIA_DIR) {
            config.media.dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Check that the configuration can drive a relay
    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(Error::config("telegram.bot_token", "bot token is required"));
        }
        if self.telegram.chat_id.trim().is_empty() {
            return Err(Error::config("telegram.chat_id", "chat id is required"));
        }
        if self.feed.topics.is_empty() {
            return Err(Error::config("feed.topics", "at least one topic is required"));
        }
        if self.feed.page_size == 0 {
            return Err(Error::config("feed.page_size", "page size must be positive"));
        }
        if self.feed.topics.iter().any(|t| t.id.trim().is_empty()) {
            return Err(Error::config("feed.topics", "topic ids must not be empty"));
        }
        self.feed.video_retry.validate("feed.video_retry")?;
        self.delivery.retry.validate("delivery.retry")?;
        self.download.retry.validate("download.retry")?;
        Ok(())
    }
}

/// Retry policy for transient failures
///
/// `max_attempts = None` retries forever; the relay uses that for downloads and sends so that
/// content is delayed rather than dropped. A multiplier of 1.0 gives a fixed backoff.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt (None = unlimited)
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Delay before the first retry (default: 5 seconds)
    #[serde(default = "default_retry_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Upper bound for any single delay (default: 5 seconds)
    #[serde(default = "default_retry_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each retry (default: 1.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl RetryPolicy {
    /// Retry without limit, waiting `delay` between attempts
    pub fn forever(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Retry at most `max_attempts` times, waiting `delay` between attempts
    pub fn bounded(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Self::forever(delay)
        }
    }

    /// Whether another retry is allowed after `attempt` retries
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt < max)
    }

    /// Reject policies whose delays cannot be computed; `key` names the policy in errors
    pub fn validate(&self, key: &str) -> Result<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::config(
                format!("{key}.backoff_multiplier"),
                format!(
                    "backoff multiplier must be a finite number of at least 1.0, got {}",
                    self.backoff_multiplier
                ),
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(Error::config(
                format!("{key}.max_delay"),
                "max delay must not be shorter than the initial delay",
            ));
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::forever(default_retry_delay())
    }
}

// Default value functions
fn default_list_url() -> String {
    "https://app.jike.ruguoapp.com/1.0/squarePosts/list".to_string()
}

fn default_video_url() -> String {
    "https://app.jike.ruguoapp.com/1.0/mediaMeta/play".to_string()
}

fn default_topics() -> Vec<TopicConfig> {
    vec![
        TopicConfig {
            id: "5aa4b7b0f69aa8001767430c".to_string(),
            name: "del".to_string(),
        },
        TopicConfig {
            id: "58edf908937e150012f846ab".to_string(),
            name: "night".to_string(),
        },
    ]
}

fn default_page_size() -> u32 {
    10
}

fn default_admin_username() -> String {
    "forumadmin".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_topic_spacing() -> Duration {
    Duration::from_secs(5)
}

fn default_feed_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_telegram_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("media")
}

fn default_send_spacing() -> Duration {
    Duration::from_secs(1)
}

fn default_item_spacing() -> Duration {
    Duration::from_secs(5)
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

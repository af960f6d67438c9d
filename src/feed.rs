//! Feed API client
//!
//! Two calls are needed: listing the newest posts of a topic, and resolving the playable URL of
//! a post's video. Both are plain JSON-over-POST requests.

use crate::config::{FeedConfig, RetryPolicy, TopicConfig};
use crate::error::{Error, FeedError, Result};
use crate::retry::with_retry;
use crate::types::{FeedPage, Post};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Source of posts and video URLs
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the newest posts of `topic`, newest first
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-200 status, or an undecodable body.
    async fn fetch_topic(&self, topic: &TopicConfig) -> Result<Vec<Post>>;

    /// Resolve the playable video URL of a post
    async fn resolve_video(&self, post_id: &str) -> Result<String>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListRequest<'a> {
    order_by: &'static str,
    load_more_key: &'static str,
    topic_id: &'a str,
    limit: u32,
}

#[derive(Deserialize)]
struct VideoMeta {
    url: Option<String>,
}

/// HTTP client for the feed API
pub struct FeedClient {
    http_client: reqwest::Client,
    list_url: String,
    video_url: String,
    page_size: u32,
    video_retry: RetryPolicy,
}

impl FeedClient {
    /// Create a client from feed settings
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("antidel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            list_url: config.list_url.clone(),
            video_url: config.video_url.clone(),
            page_size: config.page_size,
            video_retry: config.video_retry.clone(),
        })
    }

    async fn lookup_video(&self, post_id: &str) -> Result<String> {
        let response = self
            .http_client
            .post(&self.video_url)
            .query(&[("type", "ORIGINAL_POST"), ("id", post_id)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::VideoStatus {
                post_id: post_id.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let meta: VideoMeta = response.json().await?;
        meta.url.filter(|u| !u.is_empty()).ok_or_else(|| {
            FeedError::VideoUnavailable {
                post_id: post_id.to_string(),
                reason: "response has no url".to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl FeedSource for FeedClient {
    async fn fetch_topic(&self, topic: &TopicConfig) -> Result<Vec<Post>> {
        let body = ListRequest {
            order_by: "time",
            load_more_key: "null",
            topic_id: &topic.id,
            limit: self.page_size,
        };

        let response = self
            .http_client
            .post(&self.list_url)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FeedError::Status {
                topic: topic.id.clone(),
                status: status.as_u16(),
            }
            .into());
        }

        let text = response.text().await?;
        let page: FeedPage = serde_json::from_str(&text).map_err(|e| FeedError::Malformed {
            topic: topic.id.clone(),
            reason: e.to_string(),
        })?;

        debug!(topic = %topic.name, count = page.data.len(), "fetched topic");
        Ok(page.data)
    }

    async fn resolve_video(&self, post_id: &str) -> Result<String> {
        with_retry(&self.video_retry, || self.lookup_video(post_id)).await
    }
}

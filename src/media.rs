//! Remote asset downloader backed by [`AssetCache`]
//!
//! A fetch for an already cached key returns immediately. Otherwise the asset is downloaded,
//! checked against its declared `Content-Length`, and stored atomically. Transient failures are
//! retried through the configured [`RetryPolicy`]; the relay's default never gives up, so a
//! missing picture stalls delivery instead of silently disappearing from a post.

use crate::cache::{AssetCache, AssetKey};
use crate::config::RetryPolicy;
use crate::error::{DownloadError, Error, Result};
use crate::retry::with_retry;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Source of local copies of remote assets
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Return a local path holding the complete asset behind `url`
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be cached or the retry policy gives up.
    async fn fetch(&self, url: &str) -> Result<PathBuf>;
}

/// HTTP downloader that fills an [`AssetCache`]
pub struct MediaDownloader {
    client: reqwest::Client,
    cache: AssetCache,
    retry: RetryPolicy,
}

impl MediaDownloader {
    /// Create a downloader with its own HTTP client
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(cache: AssetCache, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("antidel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(client, cache, retry))
    }

    /// Create a downloader around an existing client
    pub fn with_client(client: reqwest::Client, cache: AssetCache, retry: RetryPolicy) -> Self {
        Self {
            client,
            cache,
            retry,
        }
    }

    /// The cache this downloader writes into
    pub fn cache(&self) -> &AssetCache {
        &self.cache
    }

    async fn download_once(&self, url: &str, key: &AssetKey) -> Result<PathBuf> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let expected = response.content_length();
        let bytes = response.bytes().await?;
        let received = bytes.len() as u64;

        if let Some(expected) = expected.filter(|&declared| received < declared) {
            return Err(DownloadError::ShortRead {
                url: url.to_string(),
                expected,
                received,
            }
            .into());
        }

        self.cache.finalize_write(key, &bytes).await
    }
}

#[async_trait]
impl AssetFetcher for MediaDownloader {
    async fn fetch(&self, url: &str) -> Result<PathBuf> {
        let key = AssetKey::from_url(url)?;

        if self.cache.has(&key).await {
            debug!(key = %key, "asset already cached");
            return Ok(self.cache.path_for(&key));
        }

        let path = with_retry(&self.retry, || self.download_once(url, &key)).await?;
        info!(url = %url, path = %path.display(), "asset downloaded");
        Ok(path)
    }
}

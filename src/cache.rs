//! Content-addressed local store for downloaded media
//!
//! Assets are keyed by the path component of their source URL, so
//! `https://cdn.example.com/a/b.jpg?w=100` and `https://cdn.example.com/a/b.jpg` share the
//! key `a/b.jpg`. Writes go to a hidden sibling file first and are renamed into place, so a
//! reader either sees a complete file at the key or nothing at all.

use crate::error::{DownloadError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

/// Cache key derived from a source URL path
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AssetKey(String);

impl AssetKey {
    /// Derive the key for `url`
    ///
    /// Query string and fragment are ignored. URLs without a file path, or whose path would
    /// leave the cache directory, are rejected.
    pub fn from_url(url: &str) -> Result<Self> {
        let invalid = |reason: &str| DownloadError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let parsed = Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
        let segments: Vec<&str> = parsed
            .path_segments()
            .ok_or_else(|| invalid("URL has no path"))?
            .collect();

        if segments.last().is_none_or(|s| s.is_empty()) {
            return Err(invalid("URL path does not name a file").into());
        }
        if segments
            .iter()
            .any(|s| s.is_empty() || *s == "." || *s == ".." || s.contains('\\'))
        {
            return Err(invalid("URL path has unsafe segments").into());
        }

        Ok(Self(segments.join("/")))
    }

    /// Relative path inside the cache
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased file extension, if any
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.0)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }
}

impl std::fmt::Display for AssetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local asset store rooted at a directory
#[derive(Clone, Debug)]
pub struct AssetCache {
    root: PathBuf,
}

impl AssetCache {
    /// Create a cache rooted at `root` (created lazily on first write)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the asset for `key` lives (whether or not it exists yet)
    pub fn path_for(&self, key: &AssetKey) -> PathBuf {
        self.root.join(&key.0)
    }

    /// Whether a complete asset is stored for `key`
    pub async fn has(&self, key: &AssetKey) -> bool {
        tokio::fs::try_exists(self.path_for(key))
            .await
            .unwrap_or(false)
    }

    /// Store `bytes` under `key` and return the final location
    ///
    /// The data is written to a hidden temporary file next to the target and renamed over it,
    /// so concurrent readers never observe a truncated asset.
    pub async fn finalize_write(&self, key: &AssetKey, bytes: &[u8]) -> Result<PathBuf> {
        let target = self.path_for(key);
        let store_err = |path: &Path, source: std::io::Error| DownloadError::Store {
            path: path.to_path_buf(),
            source,
        };

        let parent = target.parent().unwrap_or(&self.root).to_path_buf();
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| store_err(&parent, e))?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let temp = parent.join(format!(".{}.{:016x}.part", file_name, rand::random::<u64>()));

        if let Err(e) = write_synced(&temp, bytes).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(store_err(&temp, e).into());
        }
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(store_err(&target, e).into());
        }

        debug!(key = %key, bytes = bytes.len(), path = %target.display(), "asset stored");
        Ok(target)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

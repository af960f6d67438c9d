//! Shared test doubles for the feed, the asset fetcher and the message sink.

use crate::config::TopicConfig;
use crate::error::{DownloadError, FeedError, Result, TelegramError};
use crate::feed::FeedSource;
use crate::media::AssetFetcher;
use crate::telegram::MessageSink;
use crate::types::{Author, Location, Picture, Poi, Post, SendKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Base instant used by [`post_at`] (2020-01-12T08:00:00Z)
pub(crate) const BASE_SECS: i64 = 1_578_816_000;

/// Post by `username` created `offset` seconds after [`BASE_SECS`]
pub(crate) fn post_at(id: &str, username: &str, offset: i64) -> Post {
    Post {
        id: id.to_string(),
        user: Author {
            username: username.to_string(),
            screen_name: format!("{username} display"),
        },
        created_at: DateTime::<Utc>::from_timestamp(BASE_SECS + offset, 0)
            .unwrap()
            .into(),
        content: format!("content of {id}"),
        pictures: vec![],
        poi: None,
        link_info: None,
        video: None,
    }
}

/// Attach pictures to a post
pub(crate) fn with_pictures(mut post: Post, urls: &[&str]) -> Post {
    post.pictures = urls
        .iter()
        .map(|u| Picture {
            pic_url: u.to_string(),
        })
        .collect();
    post
}

/// Attach a `[longitude, latitude]` point of interest
pub(crate) fn with_poi(mut post: Post, longitude: f64, latitude: f64) -> Post {
    post.poi = Some(Poi {
        location: [longitude, latitude],
    });
    post
}

/// Topic config with the same id and name
pub(crate) fn topic(name: &str) -> TopicConfig {
    TopicConfig {
        id: format!("id-{name}"),
        name: name.to_string(),
    }
}

/// Feed whose responses are scripted per topic
///
/// Each call to `fetch_topic` pops the next scripted response; `Err(status)` becomes a feed
/// status error. An exhausted script answers with an empty page.
#[derive(Default)]
pub(crate) struct ScriptedFeed {
    pages: Mutex<HashMap<String, VecDeque<std::result::Result<Vec<Post>, u16>>>>,
    videos: Mutex<HashMap<String, String>>,
    calls: AtomicUsize,
}

impl ScriptedFeed {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_page(&self, topic: &TopicConfig, posts: Vec<Post>) {
        self.pages
            .lock()
            .unwrap()
            .entry(topic.id.clone())
            .or_default()
            .push_back(Ok(posts));
    }

    pub(crate) fn push_failure(&self, topic: &TopicConfig, status: u16) {
        self.pages
            .lock()
            .unwrap()
            .entry(topic.id.clone())
            .or_default()
            .push_back(Err(status));
    }

    pub(crate) fn set_video(&self, post_id: &str, url: &str) {
        self.videos
            .lock()
            .unwrap()
            .insert(post_id.to_string(), url.to_string());
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    async fn fetch_topic(&self, topic: &TopicConfig) -> Result<Vec<Post>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .pages
            .lock()
            .unwrap()
            .get_mut(&topic.id)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Ok(posts)) => Ok(posts),
            Some(Err(status)) => Err(FeedError::Status {
                topic: topic.id.clone(),
                status,
            }
            .into()),
            None => Ok(Vec::new()),
        }
    }

    async fn resolve_video(&self, post_id: &str) -> Result<String> {
        self.videos
            .lock()
            .unwrap()
            .get(post_id)
            .cloned()
            .ok_or_else(|| {
                FeedError::VideoUnavailable {
                    post_id: post_id.to_string(),
                    reason: "not scripted".to_string(),
                }
                .into()
            })
    }
}

/// Fetcher that maps URLs onto file names under a fixed root without any I/O
pub(crate) struct FakeFetcher {
    root: PathBuf,
    broken: HashSet<String>,
    fetched: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub(crate) fn new() -> Self {
        Self {
            root: PathBuf::from("/media"),
            broken: HashSet::new(),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// Make `url` fail permanently
    pub(crate) fn broken(mut self, url: &str) -> Self {
        self.broken.insert(url.to_string());
        self
    }

    pub(crate) fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    pub(crate) fn local(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

#[async_trait]
impl AssetFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<PathBuf> {
        self.fetched.lock().unwrap().push(url.to_string());
        if self.broken.contains(url) {
            return Err(DownloadError::InvalidUrl {
                url: url.to_string(),
                reason: "scripted failure".to_string(),
            }
            .into());
        }
        let name = url.rsplit('/').next().unwrap_or(url);
        Ok(self.root.join(name))
    }
}

/// A message accepted by [`RecordingSink`]
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Sent {
    Text { text: String, link_preview: bool },
    Photo(PathBuf),
    Document(PathBuf),
    MediaGroup(Vec<PathBuf>),
    Location(Location),
}

/// Scripted misbehaviour for one send
#[derive(Clone, Copy, Debug)]
pub(crate) enum Fault {
    Reject,
    TimeOut,
    Panic,
}

/// Sink that records every accepted message and can inject faults per send kind
#[derive(Default)]
pub(crate) struct RecordingSink {
    sent: Mutex<Vec<Sent>>,
    faults: Mutex<HashMap<SendKind, VecDeque<Fault>>>,
    attempts: AtomicUsize,
}

impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Apply `fault` to the next send of `kind`
    pub(crate) fn fault(&self, kind: SendKind, fault: Fault) {
        self.faults
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(fault);
    }

    pub(crate) fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn record(&self, kind: SendKind, method: &'static str, message: Sent) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let fault = self
            .faults
            .lock()
            .unwrap()
            .get_mut(&kind)
            .and_then(VecDeque::pop_front);
        match fault {
            Some(Fault::Reject) => Err(TelegramError::BadRequest {
                method,
                description: "Bad Request: scripted".to_string(),
            }
            .into()),
            Some(Fault::TimeOut) => Err(TelegramError::TimedOut { method }.into()),
            Some(Fault::Panic) => panic!("scripted panic in {method}"),
            None => {
                self.sent.lock().unwrap().push(message);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send_text(&self, text: &str, link_preview: bool) -> Result<()> {
        self.record(
            SendKind::Text,
            "sendMessage",
            Sent::Text {
                text: text.to_string(),
                link_preview,
            },
        )
    }

    async fn send_photo(&self, path: &Path) -> Result<()> {
        self.record(SendKind::Photo, "sendPhoto", Sent::Photo(path.to_path_buf()))
    }

    async fn send_document(&self, path: &Path) -> Result<()> {
        self.record(
            SendKind::Document,
            "sendDocument",
            Sent::Document(path.to_path_buf()),
        )
    }

    async fn send_media_group(&self, paths: &[&Path]) -> Result<()> {
        self.record(
            SendKind::MediaGroup,
            "sendMediaGroup",
            Sent::MediaGroup(paths.iter().map(|p| p.to_path_buf()).collect()),
        )
    }

    async fn send_location(&self, location: Location) -> Result<()> {
        self.record(
            SendKind::Location,
            "sendLocation",
            Sent::Location(location),
        )
    }
}

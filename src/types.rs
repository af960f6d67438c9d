//! Core types for antidel

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Author of a post
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    /// Stable account handle
    pub username: String,
    /// Display name shown in the relayed message
    #[serde(default)]
    pub screen_name: String,
}

/// Picture attached to a post
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Picture {
    /// Remote URL of the picture
    pub pic_url: String,
}

/// Point of interest attached to a post
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    /// Coordinates as sent by the feed: `[longitude, latitude]`
    pub location: [f64; 2],
}

/// Link attached to a post
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkInfo {
    /// Target URL
    pub link_url: String,
}

/// Geographic position
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Location {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

/// Creation time of a post
///
/// Keeps the feed's own rendering next to the parsed instant, so relayed text shows the value
/// exactly as the feed sent it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedAt {
    instant: DateTime<Utc>,
    raw: String,
}

impl CreatedAt {
    /// Parsed instant
    pub fn instant(&self) -> DateTime<Utc> {
        self.instant
    }

    /// Timestamp as received from the feed
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl From<DateTime<Utc>> for CreatedAt {
    fn from(instant: DateTime<Utc>) -> Self {
        Self {
            instant,
            raw: instant.to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }
}

impl Serialize for CreatedAt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for CreatedAt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let instant = raw
            .parse::<DateTime<Utc>>()
            .map_err(|e| serde::de::Error::custom(format!("invalid createdAt {raw:?}: {e}")))?;
        Ok(Self { instant, raw })
    }
}

/// A post fetched from the feed API
///
/// Posts are immutable once fetched. They travel from the poller through the queue to the
/// deliverer and are dropped after delivery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Unique post identifier
    pub id: String,

    /// Post author
    pub user: Author,

    /// Creation time (UTC, fractional seconds)
    pub created_at: CreatedAt,

    /// Text body
    #[serde(default)]
    pub content: String,

    /// Attached pictures, in display order
    #[serde(default)]
    pub pictures: Vec<Picture>,

    /// Optional point of interest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poi: Option<Poi>,

    /// Optional link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_info: Option<LinkInfo>,

    /// Video marker; the playable URL needs a separate lookup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<serde_json::Value>,
}

impl Post {
    /// Whether the post was written by `username`
    pub fn is_from(&self, username: &str) -> bool {
        self.user.username == username
    }

    /// Picture URLs in display order
    pub fn picture_urls(&self) -> impl Iterator<Item = &str> {
        self.pictures.iter().map(|p| p.pic_url.as_str())
    }

    /// Location, with the feed's `[longitude, latitude]` order resolved
    pub fn location(&self) -> Option<Location> {
        self.poi.as_ref().map(|poi| Location {
            longitude: poi.location[0],
            latitude: poi.location[1],
        })
    }

    /// Link URL, if the post carries one
    pub fn link_url(&self) -> Option<&str> {
        self.link_info.as_ref().map(|l| l.link_url.as_str())
    }

    /// Whether the post carries a video
    pub fn has_video(&self) -> bool {
        matches!(&self.video, Some(v) if !v.is_null())
    }

    /// Creation time exactly as the feed sent it
    pub fn created_at_display(&self) -> &str {
        self.created_at.as_str()
    }
}

/// Envelope returned by the feed list endpoint
#[derive(Clone, Debug, Deserialize)]
pub struct FeedPage {
    /// Posts, newest first
    pub data: Vec<Post>,
}

/// Creation time of the newest post seen in a topic
///
/// Starts at the Unix epoch and only moves forward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    /// Watermark at the given instant
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }

    /// Watermark at a post's creation time
    pub fn of(post: &Post) -> Self {
        Self(post.created_at.instant())
    }

    /// Underlying instant
    pub fn instant(&self) -> DateTime<Utc> {
        self.0
    }

    /// Seconds since the Unix epoch
    pub fn as_secs_f64(&self) -> f64 {
        self.0.timestamp() as f64 + f64::from(self.0.timestamp_subsec_nanos()) / 1e9
    }

    /// Whether `post` is at or before the watermark (already seen)
    pub fn covers(&self, post: &Post) -> bool {
        post.created_at.instant() <= self.0
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}", self.as_secs_f64())
    }
}

/// Kind of outbound send operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendKind {
    /// Single photo
    Photo,
    /// Single animated picture sent as a document
    Document,
    /// Grouped pictures
    MediaGroup,
    /// Location pin
    Location,
    /// Composed text
    Text,
}

impl SendKind {
    /// Name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            SendKind::Photo => "photo",
            SendKind::Document => "document",
            SendKind::MediaGroup => "media_group",
            SendKind::Location => "location",
            SendKind::Text => "text",
        }
    }
}

/// Event emitted by the relay pipeline
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A new post was pushed onto the notification queue
    PostQueued {
        /// Topic label
        topic: String,
        /// Post identifier
        post_id: String,
    },

    /// A topic's watermark moved
    WatermarkAdvanced {
        /// Topic label
        topic: String,
        /// New watermark, seconds since epoch
        watermark: f64,
    },

    /// A poll cycle was skipped because a topic request failed
    CycleSkipped {
        /// Why the cycle was skipped
        reason: String,
    },

    /// All send operations of a post were attempted
    PostDelivered {
        /// Post identifier
        post_id: String,
    },

    /// One send operation was given up
    SendAbandoned {
        /// Post identifier
        post_id: String,
        /// Operation that was abandoned
        kind: SendKind,
        /// Error that caused it
        reason: String,
    },

    /// Handling a queued post failed unexpectedly
    ItemFailed {
        /// Post identifier
        post_id: String,
        /// Error or panic message
        error: String,
    },
}

//! Core data models used throughout TikTok Pulse.
//!
//! These types represent the canonical video and comment records that flow
//! through the ingestion, merge, and enrichment pipeline. Raw scraper items
//! are loosely-typed JSON and only become one of these types after passing
//! through [`crate::normalize`].

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;

/// Storage and wire format for timestamps (UTC, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Three-way sentiment classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single short-video post.
///
/// `engagement_rate`, `sentiment_score` and `sentiment_label` are derived
/// fields: they are filled in by enrichment and are never read back from a
/// store.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct VideoRecord {
    pub id: String,
    pub url: String,
    pub caption: String,
    pub author: String,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    /// `None` when the source schema does not track saves at all.
    pub saves: Option<u64>,
    pub views: u64,
    #[serde(serialize_with = "serialize_ts")]
    pub publish_time: Option<DateTime<Utc>>,
    #[serde(serialize_with = "serialize_ts")]
    pub scraped_at: Option<DateTime<Utc>>,
    pub hashtags: Vec<String>,
    pub mentions: Vec<String>,
    pub thumbnail_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engagement_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment_label: Option<SentimentLabel>,
}

/// A comment attached to a video. `video_id` is not enforced: orphan
/// comments are legal.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct CommentRecord {
    pub id: String,
    pub video_id: String,
    pub author: String,
    pub text: String,
    pub likes: u64,
    #[serde(serialize_with = "serialize_ts")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(serialize_with = "serialize_ts")]
    pub scraped_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment_label: Option<SentimentLabel>,
}

/// Both corpora handled together: what a store returns from `fetch_all`
/// and accepts in `append`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dataset {
    pub videos: Vec<VideoRecord>,
    pub comments: Vec<CommentRecord>,
}

impl Dataset {
    pub fn new(videos: Vec<VideoRecord>, comments: Vec<CommentRecord>) -> Self {
        Self { videos, comments }
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty() && self.comments.is_empty()
    }
}

/// A record with a stable identity used for deduplication.
pub trait Keyed {
    /// The normalized identifier two records must share to be duplicates.
    fn merge_key(&self) -> Cow<'_, str>;
}

impl Keyed for VideoRecord {
    fn merge_key(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.id.trim())
    }
}

impl Keyed for CommentRecord {
    // Comment ids are only unique per video. The video id is
    // length-prefixed so no pair of ids can collide.
    fn merge_key(&self) -> Cow<'_, str> {
        let video_id = self.video_id.trim();
        Cow::Owned(format!("{}:{}:{}", video_id.len(), video_id, self.id.trim()))
    }
}

pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn serialize_ts<S: Serializer>(ts: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
    match ts {
        Some(ts) => s.serialize_str(&format_ts(ts)),
        None => s.serialize_none(),
    }
}

//! Record normalizer.
//!
//! Maps loosely-shaped raw items (scraper output or stored rows) into the
//! canonical [`VideoRecord`] / [`CommentRecord`] schema. Every field
//! coercion is total: an unexpected value shape degrades to the field's
//! default instead of failing. The only per-item failure is a missing
//! identifier, reported as [`PipelineError::Mapping`].
//!
//! Raw scraper keys (`diggCount`, `webVideoUrl`, ...) and canonical keys
//! (`likes`, `video_url`, ...) are both accepted, so the same code path
//! handles fresh scrapes, the JSON cache, and spreadsheet rows.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::error::PipelineError;
use crate::models::{CommentRecord, VideoRecord};

static HASHTAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#(\w+)").unwrap());
static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@(\w+)").unwrap());

const VIDEO_ID_KEYS: &[&str] = &["id", "video_id", "videoMeta.id"];
const VIDEO_URL_KEYS: &[&str] = &["webVideoUrl", "video_url", "url"];
const CAPTION_KEYS: &[&str] = &["text", "caption"];
const AUTHOR_KEYS: &[&str] = &["authorMeta.name", "author"];
const LIKES_KEYS: &[&str] = &["diggCount", "likes"];
const COMMENTS_KEYS: &[&str] = &["commentCount", "comments"];
const SHARES_KEYS: &[&str] = &["shareCount", "shares"];
const SAVES_KEYS: &[&str] = &["collectCount", "saves"];
const VIEWS_KEYS: &[&str] = &["playCount", "views"];
const THUMBNAIL_KEYS: &[&str] = &["coverUrl", "videoMeta.coverUrl", "thumbnail_url"];
const EPOCH_KEYS: &[&str] = &["createTime"];
const VIDEO_TIME_KEYS: &[&str] = &["createTimeISO", "publish_time", "publish_date"];
const VIDEO_SCRAPED_KEYS: &[&str] = &["scraped_at", "timestamp"];

const COMMENT_ID_KEYS: &[&str] = &["id", "cid", "comment_id"];
const COMMENT_AUTHOR_KEYS: &[&str] = &["uniqueId", "authorUniqueId", "user.uniqueId", "author"];
const COMMENT_TEXT_KEYS: &[&str] = &["text", "body"];
const COMMENT_TIME_KEYS: &[&str] = &["createTimeISO", "timestamp", "date"];
const COMMENT_SCRAPED_KEYS: &[&str] = &["scraped_at"];

/// How a batch of raw items should be normalized.
#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    /// Also extract nested `comments` arrays into [`CommentRecord`]s.
    pub extract_comments: bool,
    /// Last-resort publish time when an item carries no parseable
    /// timestamp. Fresh scrapes use the processing time; stored rows use
    /// `None`, so a malformed stored date stays missing.
    pub fallback_time: Option<DateTime<Utc>>,
    /// Value for `scraped_at` when the item does not carry one.
    pub scraped_at: Option<DateTime<Utc>>,
}

impl NormalizeOptions {
    /// Options for items straight out of a scraping job processed at `now`.
    pub fn scraped(now: DateTime<Utc>, extract_comments: bool) -> Self {
        Self {
            extract_comments,
            fallback_time: Some(now),
            scraped_at: Some(now),
        }
    }

    /// Options for rows read back from a store.
    pub fn stored() -> Self {
        Self::default()
    }
}

/// One raw item after normalization.
#[derive(Debug, Clone)]
pub struct NormalizedItem {
    pub video: VideoRecord,
    pub comments: Vec<CommentRecord>,
}

/// The result of normalizing a batch; skipped items were logged.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub videos: Vec<VideoRecord>,
    pub comments: Vec<CommentRecord>,
    pub skipped_videos: usize,
    pub skipped_comments: usize,
}

/// Normalize a single raw video item (and optionally its nested comments).
pub fn normalize_item(raw: &Value, opts: &NormalizeOptions) -> Result<NormalizedItem, PipelineError> {
    if !raw.is_object() {
        return Err(PipelineError::Mapping(format!(
            "expected an object, got {}",
            value_kind(raw)
        )));
    }

    let id = first_present(raw, VIDEO_ID_KEYS)
        .and_then(coerce_id)
        .ok_or_else(|| PipelineError::Mapping("item has no derivable id".to_string()))?;

    let caption = string_field(raw, CAPTION_KEYS);
    let hashtags = structured_tags(raw.get("hashtags"), '#')
        .unwrap_or_else(|| scan_tags(&HASHTAG_RE, &caption));
    let mentions = structured_tags(raw.get("mentions"), '@')
        .unwrap_or_else(|| scan_tags(&MENTION_RE, &caption));

    let video = VideoRecord {
        url: string_field(raw, VIDEO_URL_KEYS),
        author: string_field(raw, AUTHOR_KEYS),
        likes: count_field(raw, LIKES_KEYS),
        comments: count_field(raw, COMMENTS_KEYS),
        shares: count_field(raw, SHARES_KEYS),
        saves: saves_field(raw, opts),
        views: count_field(raw, VIEWS_KEYS),
        publish_time: resolve_time(raw, EPOCH_KEYS, VIDEO_TIME_KEYS).or(opts.fallback_time),
        scraped_at: resolve_time(raw, &[], VIDEO_SCRAPED_KEYS).or(opts.scraped_at),
        hashtags,
        mentions,
        thumbnail_url: string_field(raw, THUMBNAIL_KEYS),
        caption,
        id,
        engagement_rate: None,
        sentiment_score: None,
        sentiment_label: None,
    };

    let mut comments = Vec::new();
    if opts.extract_comments {
        if let Some(Value::Array(raw_comments)) = raw.get("comments") {
            for raw_comment in raw_comments {
                match normalize_comment(raw_comment, &video.id, opts) {
                    Ok(c) => comments.push(c),
                    Err(e) => {
                        tracing::warn!(video_id = %video.id, error = %e, "skipping comment");
                    }
                }
            }
        }
    }

    Ok(NormalizedItem { video, comments })
}

/// Normalize a raw comment belonging to `video_id`.
pub fn normalize_comment(
    raw: &Value,
    video_id: &str,
    opts: &NormalizeOptions,
) -> Result<CommentRecord, PipelineError> {
    if !raw.is_object() {
        return Err(PipelineError::Mapping(format!(
            "expected a comment object, got {}",
            value_kind(raw)
        )));
    }

    let id = first_present(raw, COMMENT_ID_KEYS)
        .and_then(coerce_id)
        .ok_or_else(|| PipelineError::Mapping("comment has no derivable id".to_string()))?;

    Ok(CommentRecord {
        id,
        video_id: video_id.to_string(),
        author: string_field(raw, COMMENT_AUTHOR_KEYS),
        text: string_field(raw, COMMENT_TEXT_KEYS),
        likes: count_field(raw, LIKES_KEYS),
        timestamp: resolve_time(raw, EPOCH_KEYS, COMMENT_TIME_KEYS).or(opts.fallback_time),
        scraped_at: resolve_time(raw, &[], COMMENT_SCRAPED_KEYS).or(opts.scraped_at),
        sentiment_score: None,
        sentiment_label: None,
    })
}

/// Normalize a stored comment row, which carries its own `video_id`.
pub fn normalize_comment_row(
    raw: &Value,
    opts: &NormalizeOptions,
) -> Result<CommentRecord, PipelineError> {
    let video_id = raw
        .get("video_id")
        .and_then(coerce_id)
        .unwrap_or_default();
    normalize_comment(raw, &video_id, opts)
}

/// Normalize every item of a batch. Failures are logged and counted;
/// they never abort the batch.
pub fn normalize_batch<'a, I>(items: I, opts: &NormalizeOptions) -> NormalizedBatch
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut batch = NormalizedBatch::default();
    for (index, raw) in items.into_iter().enumerate() {
        match normalize_item(raw, opts) {
            Ok(item) => {
                if opts.extract_comments {
                    let nested = raw
                        .get("comments")
                        .and_then(Value::as_array)
                        .map(|c| c.len())
                        .unwrap_or(0);
                    batch.skipped_comments += nested.saturating_sub(item.comments.len());
                }
                batch.videos.push(item.video);
                batch.comments.extend(item.comments);
            }
            Err(e) => {
                tracing::warn!(index, error = %e, "skipping raw item");
                batch.skipped_videos += 1;
            }
        }
    }
    batch
}

/// Parse a timestamp string in any of the formats the sources produce:
/// RFC 3339 / ISO-8601 (with or without offset), `YYYY-MM-DD HH:MM:SS`,
/// a bare date, or epoch seconds.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse::<i64>().ok().and_then(|secs| DateTime::from_timestamp(secs, 0));
    }
    None
}

/// Coerce any JSON value to a non-negative integer count. Missing,
/// non-numeric, negative and non-finite values all become 0.
pub fn coerce_count(value: &Value) -> u64 {
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                u
            } else if let Some(f) = n.as_f64() {
                float_to_count(f)
            } else {
                0
            }
        }
        Value::String(s) => {
            let s = s.trim().replace(',', "");
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(float_to_count))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

fn float_to_count(f: f64) -> u64 {
    if f.is_finite() && f > 0.0 {
        f.trunc() as u64
    } else {
        0
    }
}

/// Render an identifier as a normalized string, so numeric and string ids
/// that print identically collide.
pub fn coerce_id(value: &Value) -> Option<String> {
    let id = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                        format!("{}", f as i64)
                    }
                    Some(f) if f.is_finite() => f.to_string(),
                    _ => return None,
                }
            }
        }
        _ => return None,
    };
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Look up a dotted path (`"authorMeta.name"`), treating `null` as absent.
fn lookup<'a>(raw: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = raw;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

fn first_present<'a>(raw: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths.iter().find_map(|p| lookup(raw, p))
}

fn string_field(raw: &Value, paths: &[&str]) -> String {
    paths
        .iter()
        .filter_map(|p| lookup(raw, p))
        .find_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}

fn count_field(raw: &Value, paths: &[&str]) -> u64 {
    first_present(raw, paths).map(coerce_count).unwrap_or(0)
}

fn saves_field(raw: &Value, opts: &NormalizeOptions) -> Option<u64> {
    match first_present(raw, SAVES_KEYS) {
        Some(v) => Some(coerce_count(v)),
        // Fresh scrapes always track saves; an absent key means zero.
        None if opts.fallback_time.is_some() => Some(0),
        None => None,
    }
}

/// Epoch fields first, then textual fields. Unparseable values are logged
/// and treated as missing.
fn resolve_time(raw: &Value, epoch_keys: &[&str], text_keys: &[&str]) -> Option<DateTime<Utc>> {
    for key in epoch_keys {
        if let Some(v) = lookup(raw, key) {
            let parsed = match v {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
                    .and_then(|secs| DateTime::from_timestamp(secs, 0)),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(|secs| DateTime::from_timestamp(secs, 0)),
                _ => None,
            };
            if parsed.is_some() {
                return parsed;
            }
            log_malformed(key, v);
        }
    }
    for key in text_keys {
        if let Some(v) = lookup(raw, key) {
            let parsed = match v {
                Value::String(s) => parse_timestamp(s),
                Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
                _ => None,
            };
            if parsed.is_some() {
                return parsed;
            }
            log_malformed(key, v);
        }
    }
    None
}

fn log_malformed(key: &str, value: &Value) {
    // Empty strings are how spreadsheets spell "missing".
    if value.as_str().is_some_and(|s| s.trim().is_empty()) {
        return;
    }
    let err = PipelineError::MalformedTimestamp(value.to_string());
    tracing::debug!(field = key, error = %err, "ignoring timestamp");
}

/// Structured hashtag / mention list. Accepts an array of strings, an
/// array of `{ "name": ... }` objects, or a comma-separated string.
/// Returns `None` when the list is absent or yields no names.
fn structured_tags(value: Option<&Value>, sigil: char) -> Option<Vec<String>> {
    let names: Vec<String> = match value? {
        Value::Array(entries) => entries
            .iter()
            .filter_map(|e| match e {
                Value::String(s) => Some(s.clone()),
                Value::Object(_) => e.get("name").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        _ => return None,
    };
    let tags = ordered_unique(
        names
            .into_iter()
            .map(|n| n.trim().trim_start_matches(sigil).to_string()),
    );
    if tags.is_empty() {
        None
    } else {
        Some(tags)
    }
}

fn scan_tags(re: &Regex, text: &str) -> Vec<String> {
    ordered_unique(re.captures_iter(text).map(|c| c[1].to_string()))
}

fn ordered_unique(iter: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    iter.filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

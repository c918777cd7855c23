//! Spreadsheet-backed store over the Google Sheets values API.
//!
//! Each corpus lives in its own range with a header row. Rows are read as
//! header-keyed objects and passed through the normalizer; a missing
//! `saves` column means saves are not tracked for that sheet.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::time::Duration;

use super::{CorpusStore, InsertCounts};
use crate::config::{SheetsConfig, STORE_SHEETS};
use crate::models::{format_ts, CommentRecord, Dataset, Keyed, VideoRecord};
use crate::normalize::{normalize_comment_row, normalize_item, NormalizeOptions};

pub const VIDEO_HEADERS: &[&str] = &[
    "timestamp",
    "video_id",
    "video_url",
    "caption",
    "author",
    "likes",
    "comments",
    "shares",
    "saves",
    "views",
    "publish_date",
    "hashtags",
    "mentions",
    "thumbnail_url",
];

pub const COMMENT_HEADERS: &[&str] = &[
    "scraped_at",
    "video_id",
    "comment_id",
    "author",
    "text",
    "likes",
    "date",
];

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

pub struct SheetStore {
    client: reqwest::Client,
    token: String,
    api_base: String,
    spreadsheet_id: String,
    videos_range: String,
    comments_range: String,
}

impl SheetStore {
    pub fn new(config: &SheetsConfig, token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            token,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            spreadsheet_id: config.spreadsheet_id.clone(),
            videos_range: config.videos_range.clone(),
            comments_range: config.comments_range.clone(),
        })
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/{}/values/{}",
            self.api_base,
            self.spreadsheet_id,
            range.replace(' ', "%20")
        )
    }

    async fn get_rows(&self, range: &str) -> Result<Vec<Vec<Value>>> {
        let resp = self
            .client
            .get(self.values_url(range))
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("GET {} failed", range))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Sheets API error (status {}) reading {}: {}", status.as_u16(), range, body);
        }
        let range_values: ValueRange = resp
            .json()
            .await
            .with_context(|| format!("Unexpected response reading {}", range))?;
        Ok(range_values.values)
    }

    async fn append_rows(&self, range: &str, rows: Vec<Vec<Value>>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let url = format!(
            "{}:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS",
            self.values_url(range)
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "values": rows }))
            .send()
            .await
            .with_context(|| format!("append to {} failed", range))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Sheets API error (status {}) appending {}: {}", status.as_u16(), range, body);
        }
        Ok(())
    }
}

/// Turn a header row plus data rows into header-keyed JSON objects.
/// Blank cells and the missing tail of short rows are left out of the
/// object; blank rows are dropped.
pub fn rows_to_objects(rows: &[Vec<Value>]) -> Vec<Value> {
    let Some((header, data)) = rows.split_first() else {
        return Vec::new();
    };
    let keys: Vec<String> = header
        .iter()
        .map(|h| h.as_str().unwrap_or_default().trim().to_lowercase())
        .collect();

    data.iter()
        .filter(|row| row.iter().any(|cell| !cell_is_blank(cell)))
        .map(|row| {
            let mut obj = Map::new();
            for (key, cell) in keys.iter().zip(row.iter()) {
                if !key.is_empty() && !cell_is_blank(cell) {
                    obj.insert(key.clone(), cell.clone());
                }
            }
            Value::Object(obj)
        })
        .collect()
}

fn cell_is_blank(cell: &Value) -> bool {
    match cell {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

pub fn video_row(v: &VideoRecord) -> Vec<Value> {
    vec![
        json!(v.scraped_at.as_ref().map(format_ts).unwrap_or_default()),
        json!(v.id),
        json!(v.url),
        json!(v.caption),
        json!(v.author),
        json!(v.likes),
        json!(v.comments),
        json!(v.shares),
        // Untracked saves stay an empty cell.
        v.saves.map_or_else(|| json!(""), |saves| json!(saves)),
        json!(v.views),
        json!(v.publish_time.as_ref().map(format_ts).unwrap_or_default()),
        json!(v.hashtags.join(", ")),
        json!(v.mentions.join(", ")),
        json!(v.thumbnail_url),
    ]
}

pub fn comment_row(c: &CommentRecord) -> Vec<Value> {
    vec![
        json!(c.scraped_at.as_ref().map(format_ts).unwrap_or_default()),
        json!(c.video_id),
        json!(c.id),
        json!(c.author),
        json!(c.text),
        json!(c.likes),
        json!(c.timestamp.as_ref().map(format_ts).unwrap_or_default()),
    ]
}

fn header_row(headers: &[&str]) -> Vec<Value> {
    headers.iter().map(|h| json!(h)).collect()
}

#[async_trait]
impl CorpusStore for SheetStore {
    fn name(&self) -> &str {
        STORE_SHEETS
    }

    async fn fetch_all(&self) -> Result<Dataset> {
        let opts = NormalizeOptions::stored();
        let mut data = Dataset::default();

        for raw in rows_to_objects(&self.get_rows(&self.videos_range).await?) {
            match normalize_item(&raw, &opts) {
                Ok(item) => data.videos.push(item.video),
                Err(e) => tracing::warn!(store = STORE_SHEETS, error = %e, "skipping sheet row"),
            }
        }
        for raw in rows_to_objects(&self.get_rows(&self.comments_range).await?) {
            match normalize_comment_row(&raw, &opts) {
                Ok(c) => data.comments.push(c),
                Err(e) => tracing::warn!(store = STORE_SHEETS, error = %e, "skipping comment row"),
            }
        }
        Ok(data)
    }

    async fn append(&self, data: &Dataset) -> Result<InsertCounts> {
        let video_sheet = self.get_rows(&self.videos_range).await?;
        let comment_sheet = self.get_rows(&self.comments_range).await?;
        let opts = NormalizeOptions::stored();

        let mut known_videos: HashSet<String> = rows_to_objects(&video_sheet)
            .iter()
            .filter_map(|raw| normalize_item(raw, &opts).ok())
            .map(|item| item.video.merge_key().into_owned())
            .collect();
        let mut known_comments: HashSet<String> = rows_to_objects(&comment_sheet)
            .iter()
            .filter_map(|raw| normalize_comment_row(raw, &opts).ok())
            .map(|c| c.merge_key().into_owned())
            .collect();

        let mut video_rows = Vec::new();
        if video_sheet.is_empty() {
            video_rows.push(header_row(VIDEO_HEADERS));
        }
        let header_len = video_rows.len();
        for v in &data.videos {
            if known_videos.insert(v.merge_key().into_owned()) {
                video_rows.push(video_row(v));
            }
        }
        let videos = video_rows.len() - header_len;

        let mut comment_rows = Vec::new();
        if comment_sheet.is_empty() {
            comment_rows.push(header_row(COMMENT_HEADERS));
        }
        let header_len = comment_rows.len();
        for c in &data.comments {
            if known_comments.insert(c.merge_key().into_owned()) {
                comment_rows.push(comment_row(c));
            }
        }
        let comments = comment_rows.len() - header_len;

        if videos > 0 {
            self.append_rows(&self.videos_range, video_rows).await?;
        }
        if comments > 0 {
            self.append_rows(&self.comments_range, comment_rows).await?;
        }
        tracing::debug!(videos, comments, "appended sheet rows");
        Ok(InsertCounts { videos, comments })
    }
}

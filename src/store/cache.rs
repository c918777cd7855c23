//! JSON file cache: `{"videos": [...], "comments": [...]}`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::{CorpusStore, InsertCounts};
use crate::config::STORE_CACHE;
use crate::merge::merge_dataset;
use crate::models::Dataset;
use crate::normalize::{normalize_comment_row, normalize_item, NormalizeOptions};

pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&self, data: &Dataset) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut stripped = data.clone();
        for v in &mut stripped.videos {
            v.engagement_rate = None;
            v.sentiment_score = None;
            v.sentiment_label = None;
        }
        for c in &mut stripped.comments {
            c.sentiment_score = None;
            c.sentiment_label = None;
        }
        let body = serde_json::to_vec_pretty(&stripped)?;

        // Write next to the target and rename over it so readers never see
        // a partial file.
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

/// Parse cache file content. Unmappable entries are logged and skipped.
pub fn parse_cache(content: &str) -> Result<Dataset> {
    let root: Value = serde_json::from_str(content).context("cache file is not valid JSON")?;
    let opts = NormalizeOptions::stored();
    let mut data = Dataset::default();

    let entries = |key: &str| -> Vec<Value> {
        root.get(key)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    };

    for raw in entries("videos") {
        match normalize_item(&raw, &opts) {
            Ok(item) => data.videos.push(item.video),
            Err(e) => tracing::warn!(store = STORE_CACHE, error = %e, "skipping cached video"),
        }
    }
    for raw in entries("comments") {
        match normalize_comment_row(&raw, &opts) {
            Ok(c) => data.comments.push(c),
            Err(e) => tracing::warn!(store = STORE_CACHE, error = %e, "skipping cached comment"),
        }
    }
    Ok(data)
}

#[async_trait]
impl CorpusStore for CacheStore {
    fn name(&self) -> &str {
        STORE_CACHE
    }

    async fn fetch_all(&self) -> Result<Dataset> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Dataset::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };
        if content.trim().is_empty() {
            return Ok(Dataset::default());
        }
        parse_cache(&content).with_context(|| format!("in {}", self.path.display()))
    }

    async fn append(&self, data: &Dataset) -> Result<InsertCounts> {
        let mut cached = self.fetch_all().await?;
        let stats = merge_dataset(&mut cached, data.clone());
        let counts = InsertCounts {
            videos: stats.videos.appended,
            comments: stats.comments.appended,
        };
        if counts.videos > 0 || counts.comments > 0 {
            self.write(&cached).await?;
        }
        Ok(counts)
    }
}

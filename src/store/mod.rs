//! Persistent corpus stores.
//!
//! Every store holds both corpora and implements [`CorpusStore`]. Reads
//! return raw-ish records that have been through the normalizer with
//! stored-row rules; derived fields are never read back. Writes are
//! append-only and skip keys the store already holds, so every store is
//! first-seen-wins on its own as well.
//!
//! | Store | Backing | Role |
//! |-------|---------|------|
//! | [`CacheStore`] | JSON file | local cache, fastest to read |
//! | [`SqliteStore`] | SQLite via `sqlx` | durable store |
//! | [`SheetStore`] | Google Sheets values API | shared spreadsheet |

pub mod cache;
pub mod sheets;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

pub use cache::CacheStore;
pub use sheets::SheetStore;
pub use sqlite::SqliteStore;

use crate::config::{Config, STORE_CACHE, STORE_SHEETS, STORE_SQLITE};
use crate::error::PipelineError;
use crate::models::Dataset;

/// Rows actually written by one append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InsertCounts {
    pub videos: usize,
    pub comments: usize,
}

/// Result of a store health probe, as listed by `pulse sources`.
#[derive(Debug, Clone, Serialize)]
pub struct StoreHealth {
    pub name: String,
    pub status: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub videos: Option<usize>,
}

impl StoreHealth {
    pub fn ok(name: &str, videos: usize) -> Self {
        Self {
            name: name.to_string(),
            status: "OK".to_string(),
            healthy: true,
            videos: Some(videos),
        }
    }

    pub fn failed(name: &str, status: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: status.into(),
            healthy: false,
            videos: None,
        }
    }
}

#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Store name as used in `merge.source_priority`.
    fn name(&self) -> &str;

    /// Every stored video and comment, in first-insertion order.
    async fn fetch_all(&self) -> Result<Dataset>;

    /// Append records whose keys the store does not hold yet.
    async fn append(&self, data: &Dataset) -> Result<InsertCounts>;

    async fn health(&self) -> StoreHealth {
        match self.fetch_all().await {
            Ok(data) => StoreHealth::ok(self.name(), data.videos.len()),
            Err(e) => StoreHealth::failed(self.name(), format!("ERROR: {:#}", e)),
        }
    }
}

/// Open the stores named in `merge.source_priority`, in that order.
///
/// A store that cannot be opened is logged as unavailable and left out;
/// the remaining stores are still returned.
pub async fn open_stores(config: &Config) -> Vec<Box<dyn CorpusStore>> {
    let mut stores: Vec<Box<dyn CorpusStore>> = Vec::new();
    for name in &config.merge.source_priority {
        match open_store(config, name).await {
            Ok(Some(store)) => stores.push(store),
            Ok(None) => {}
            Err(e) => {
                let err = PipelineError::SourceUnavailable {
                    source_name: name.clone(),
                    message: format!("{:#}", e),
                };
                tracing::warn!(error = %err, "store left out");
            }
        }
    }
    stores
}

async fn open_store(config: &Config, name: &str) -> Result<Option<Box<dyn CorpusStore>>> {
    let store: Box<dyn CorpusStore> = match name {
        STORE_CACHE => Box::new(CacheStore::new(config.cache.path.clone())),
        STORE_SQLITE => Box::new(SqliteStore::open(&config.db.path).await?),
        STORE_SHEETS => {
            let Some(sheets) = &config.sheets else {
                tracing::debug!("[sheets] not configured");
                return Ok(None);
            };
            let Some(token) = config.sheets_token() else {
                anyhow::bail!("no access token (set sheets.access_token or PULSE_SHEETS_TOKEN)");
            };
            Box::new(SheetStore::new(sheets, token)?)
        }
        other => anyhow::bail!("unknown store '{}'", other),
    };
    Ok(Some(store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_stores_follows_priority() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.db.path = tmp.path().join("p.sqlite");
        config.cache.path = tmp.path().join("cache.json");
        config.merge.source_priority = vec!["sqlite".into(), "sheets".into(), "cache".into()];

        let stores = open_stores(&config).await;
        let names: Vec<&str> = stores.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["sqlite", "cache"]);
    }

    #[tokio::test]
    async fn test_health_reports_counts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path().join("cache.json"));
        let health = store.health().await;
        assert!(health.healthy);
        assert_eq!(health.videos, Some(0));
    }
}

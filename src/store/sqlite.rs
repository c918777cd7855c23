//! Durable SQLite store.
//!
//! Rows are written with `INSERT ... ON CONFLICT DO NOTHING`, so the first
//! version of a record ever stored is the one kept. Hashtags and mentions
//! are stored comma-separated, timestamps as `%Y-%m-%d %H:%M:%S` text.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use super::{CorpusStore, InsertCounts};
use crate::config::STORE_SQLITE;
use crate::db;
use crate::migrate::create_schema;
use crate::models::{format_ts, Dataset};
use crate::normalize::{normalize_comment_row, normalize_item, NormalizeOptions};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and make sure the schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        create_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl CorpusStore for SqliteStore {
    fn name(&self) -> &str {
        STORE_SQLITE
    }

    async fn fetch_all(&self) -> Result<Dataset> {
        let opts = NormalizeOptions::stored();
        let mut data = Dataset::default();

        let rows = sqlx::query(
            r#"
            SELECT id, url, caption, author, likes, comments, shares, saves, views,
                   publish_time, scraped_at, hashtags, mentions, thumbnail_url
            FROM videos
            ORDER BY rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        for row in &rows {
            // Rows go back through the normalizer so stored values get the
            // same coercions as any other source.
            let raw = json!({
                "video_id": row.get::<String, _>("id"),
                "video_url": row.get::<String, _>("url"),
                "caption": row.get::<String, _>("caption"),
                "author": row.get::<String, _>("author"),
                "likes": row.get::<i64, _>("likes"),
                "comments": row.get::<i64, _>("comments"),
                "shares": row.get::<i64, _>("shares"),
                "saves": row.get::<Option<i64>, _>("saves"),
                "views": row.get::<i64, _>("views"),
                "publish_time": row.get::<Option<String>, _>("publish_time"),
                "scraped_at": row.get::<Option<String>, _>("scraped_at"),
                "hashtags": row.get::<String, _>("hashtags"),
                "mentions": row.get::<String, _>("mentions"),
                "thumbnail_url": row.get::<String, _>("thumbnail_url"),
            });
            match normalize_item(&raw, &opts) {
                Ok(item) => data.videos.push(item.video),
                Err(e) => tracing::warn!(store = STORE_SQLITE, error = %e, "skipping stored video"),
            }
        }

        let rows = sqlx::query(
            r#"
            SELECT video_id, id, author, text, likes, timestamp, scraped_at
            FROM comments
            ORDER BY rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        for row in &rows {
            let raw = json!({
                "video_id": row.get::<String, _>("video_id"),
                "comment_id": row.get::<String, _>("id"),
                "author": row.get::<String, _>("author"),
                "text": row.get::<String, _>("text"),
                "likes": row.get::<i64, _>("likes"),
                "timestamp": row.get::<Option<String>, _>("timestamp"),
                "scraped_at": row.get::<Option<String>, _>("scraped_at"),
            });
            match normalize_comment_row(&raw, &opts) {
                Ok(c) => data.comments.push(c),
                Err(e) => tracing::warn!(store = STORE_SQLITE, error = %e, "skipping stored comment"),
            }
        }

        Ok(data)
    }

    async fn append(&self, data: &Dataset) -> Result<InsertCounts> {
        let mut tx = self.pool.begin().await?;
        let mut counts = InsertCounts::default();

        for v in &data.videos {
            let result = sqlx::query(
                r#"
                INSERT INTO videos (id, url, caption, author, likes, comments, shares, saves, views,
                                    publish_time, scraped_at, hashtags, mentions, thumbnail_url)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(v.id.trim())
            .bind(&v.url)
            .bind(&v.caption)
            .bind(&v.author)
            .bind(to_sql_int(v.likes))
            .bind(to_sql_int(v.comments))
            .bind(to_sql_int(v.shares))
            .bind(v.saves.map(to_sql_int))
            .bind(to_sql_int(v.views))
            .bind(v.publish_time.as_ref().map(format_ts))
            .bind(v.scraped_at.as_ref().map(format_ts))
            .bind(v.hashtags.join(","))
            .bind(v.mentions.join(","))
            .bind(&v.thumbnail_url)
            .execute(&mut *tx)
            .await?;
            counts.videos += result.rows_affected() as usize;
        }

        for c in &data.comments {
            let result = sqlx::query(
                r#"
                INSERT INTO comments (video_id, id, author, text, likes, timestamp, scraped_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(video_id, id) DO NOTHING
                "#,
            )
            .bind(c.video_id.trim())
            .bind(c.id.trim())
            .bind(&c.author)
            .bind(&c.text)
            .bind(to_sql_int(c.likes))
            .bind(c.timestamp.as_ref().map(format_ts))
            .bind(c.scraped_at.as_ref().map(format_ts))
            .execute(&mut *tx)
            .await?;
            counts.comments += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(counts)
    }
}

fn to_sql_int(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CommentRecord, VideoRecord};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn video(id: &str, likes: u64) -> VideoRecord {
        VideoRecord {
            id: id.into(),
            url: format!("https://t/{}", id),
            caption: "hello #one @two".into(),
            likes,
            views: 10,
            publish_time: Some(Utc.with_ymd_and_hms(2024, 5, 5, 5, 5, 5).unwrap()),
            hashtags: vec!["one".into(), "three".into()],
            mentions: vec!["two".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(&tmp.path().join("p.sqlite")).await.unwrap();
        let v = video("a", 3);
        let c = CommentRecord {
            id: "1".into(),
            video_id: "a".into(),
            author: "fan".into(),
            text: "great".into(),
            likes: 2,
            timestamp: Some(Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        let counts = store
            .append(&Dataset::new(vec![v.clone()], vec![c.clone()]))
            .await
            .unwrap();
        assert_eq!(counts, InsertCounts { videos: 1, comments: 1 });

        let back = store.fetch_all().await.unwrap();
        assert_eq!(back.videos, vec![v]);
        assert_eq!(back.comments, vec![c]);
    }

    #[tokio::test]
    async fn test_conflicts_keep_first_row() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(&tmp.path().join("p.sqlite")).await.unwrap();
        store
            .append(&Dataset::new(vec![video("a", 1), video("b", 2)], vec![]))
            .await
            .unwrap();
        let counts = store
            .append(&Dataset::new(vec![video("b", 50), video("c", 3)], vec![]))
            .await
            .unwrap();
        assert_eq!(counts.videos, 1);

        let back = store.fetch_all().await.unwrap();
        let summary: Vec<(&str, u64)> = back.videos.iter().map(|v| (v.id.as_str(), v.likes)).collect();
        assert_eq!(summary, vec![("a", 1), ("b", 2), ("c", 3)]);
    }

    #[tokio::test]
    async fn test_comment_ids_scoped_per_video() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(&tmp.path().join("p.sqlite")).await.unwrap();
        let comment = |video_id: &str| CommentRecord {
            id: "1".into(),
            video_id: video_id.into(),
            ..Default::default()
        };
        let counts = store
            .append(&Dataset::new(vec![], vec![comment("a"), comment("b"), comment("a")]))
            .await
            .unwrap();
        assert_eq!(counts.comments, 2);
    }

    #[tokio::test]
    async fn test_untracked_saves_stay_none() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(&tmp.path().join("p.sqlite")).await.unwrap();
        let mut tracked = video("t", 1);
        tracked.saves = Some(0);
        store
            .append(&Dataset::new(vec![video("u", 1), tracked], vec![]))
            .await
            .unwrap();
        let back = store.fetch_all().await.unwrap();
        assert_eq!(back.videos[0].saves, None);
        assert_eq!(back.videos[1].saves, Some(0));
    }
}

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Idempotent schema creation. Derived fields (engagement rate, sentiment)
/// have no columns: they are recomputed on every load. Rows are read back
/// in `rowid` order, which is first-insertion order.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // Videos, keyed by external id
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS videos (
            id TEXT PRIMARY KEY,
            url TEXT NOT NULL DEFAULT '',
            caption TEXT NOT NULL DEFAULT '',
            author TEXT NOT NULL DEFAULT '',
            likes INTEGER NOT NULL DEFAULT 0,
            comments INTEGER NOT NULL DEFAULT 0,
            shares INTEGER NOT NULL DEFAULT 0,
            saves INTEGER,
            views INTEGER NOT NULL DEFAULT 0,
            publish_time TEXT,
            scraped_at TEXT,
            hashtags TEXT NOT NULL DEFAULT '',
            mentions TEXT NOT NULL DEFAULT '',
            thumbnail_url TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Comments; ids are only unique per video
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS comments (
            video_id TEXT NOT NULL,
            id TEXT NOT NULL,
            author TEXT NOT NULL DEFAULT '',
            text TEXT NOT NULL DEFAULT '',
            likes INTEGER NOT NULL DEFAULT 0,
            timestamp TEXT,
            scraped_at TEXT,
            PRIMARY KEY (video_id, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_comments_video_id ON comments(video_id)")
        .execute(pool)
        .await?;

    Ok(())
}

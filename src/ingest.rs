//! Ingestion pipeline orchestration.
//!
//! Coordinates the two flows the rest of the crate is built around:
//!
//! - **ingest**: raw items → normalization → `--since` / `--limit`
//!   filtering → merge against the known corpus → append the new records
//!   to every store.
//! - **load**: read each store in `merge.source_priority` order, merge
//!   them first-seen-wins, then enrich (engagement rate, sentiment).
//!
//! A store that fails to read is logged as unavailable and skipped; a
//! store that fails to write is reported in the summary. Neither aborts
//! the run.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::collector::{ApifyClient, ScrapeRequest};
use crate::config::Config;
use crate::error::PipelineError;
use crate::merge::{merge_dataset, DatasetMergeStats};
use crate::metrics::apply_engagement;
use crate::models::Dataset;
use crate::normalize::{normalize_batch, NormalizeOptions};
use crate::sentiment::{build_scorer, classify_comments, classify_videos, Lexicon, SentimentScorer};
use crate::store::{open_stores, CorpusStore, InsertCounts};

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Extract nested comment threads from raw items.
    pub extract_comments: bool,
    /// Drop videos published before this date (UTC midnight).
    pub since: Option<NaiveDate>,
    /// Accept at most this many videos from the batch.
    pub limit: Option<usize>,
    /// Normalize and merge, but write nothing.
    pub dry_run: bool,
}

/// Normalized, filtered batch ready to merge.
#[derive(Debug, Default)]
pub struct PreparedBatch {
    pub data: Dataset,
    pub received: usize,
    pub skipped_videos: usize,
    pub skipped_comments: usize,
    pub filtered: usize,
}

/// Outcome of writing to one store.
#[derive(Debug, Clone, Serialize)]
pub struct SinkResult {
    pub store: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub written: Option<InsertCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub received: usize,
    pub videos: usize,
    pub comments: usize,
    pub skipped_videos: usize,
    pub skipped_comments: usize,
    pub filtered: usize,
    pub new_videos: usize,
    pub new_comments: usize,
    pub duplicate_videos: usize,
    pub duplicate_comments: usize,
    pub dry_run: bool,
    pub sinks: Vec<SinkResult>,
}

/// The corpus as loaded from the stores, before enrichment.
#[derive(Debug, Default)]
pub struct LoadedCorpus {
    pub data: Dataset,
    pub stats: DatasetMergeStats,
    pub unavailable: Vec<String>,
}

/// Normalize `items` and apply the `since` / `limit` filters.
///
/// Comments whose video was filtered out go with it.
pub fn prepare_batch(items: &[Value], opts: &IngestOptions, now: DateTime<Utc>) -> PreparedBatch {
    let normalize_opts = NormalizeOptions::scraped(now, opts.extract_comments);
    let batch = normalize_batch(items, &normalize_opts);
    let normalized = batch.videos.len();

    let cutoff = opts
        .since
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| n.and_utc());

    let mut videos = batch.videos;
    if let Some(cutoff) = cutoff {
        videos.retain(|v| v.publish_time.is_none_or(|t| t >= cutoff));
    }
    if let Some(limit) = opts.limit {
        videos.truncate(limit);
    }
    let filtered = normalized - videos.len();

    let comments = if filtered > 0 {
        let kept: HashSet<&str> = videos.iter().map(|v| v.id.as_str()).collect();
        batch
            .comments
            .into_iter()
            .filter(|c| kept.contains(c.video_id.as_str()))
            .collect()
    } else {
        batch.comments
    };

    PreparedBatch {
        data: Dataset::new(videos, comments),
        received: items.len(),
        skipped_videos: batch.skipped_videos,
        skipped_comments: batch.skipped_comments,
        filtered,
    }
}

/// Merge every store's contents in priority order.
pub async fn load_dataset(stores: &[Box<dyn CorpusStore>]) -> LoadedCorpus {
    let mut loaded = LoadedCorpus::default();
    for store in stores {
        match store.fetch_all().await {
            Ok(data) => {
                let stats = merge_dataset(&mut loaded.data, data);
                tracing::debug!(
                    store = store.name(),
                    videos = stats.videos.appended,
                    duplicates = stats.videos.discarded,
                    "merged store"
                );
                loaded.stats.absorb(stats);
            }
            Err(e) => {
                let err = PipelineError::SourceUnavailable {
                    source_name: store.name().to_string(),
                    message: format!("{:#}", e),
                };
                tracing::warn!(error = %err, "continuing without store");
                loaded.unavailable.push(store.name().to_string());
            }
        }
    }
    loaded
}

/// Recompute every derived field in place.
pub fn enrich(data: &mut Dataset, scorer: &dyn SentimentScorer) {
    apply_engagement(&mut data.videos);
    classify_videos(&mut data.videos, scorer);
    classify_comments(&mut data.comments, scorer);
}

/// Built once per process: the opened stores and the sentiment scorer.
pub struct Pipeline {
    stores: Vec<Box<dyn CorpusStore>>,
    scorer: Box<dyn SentimentScorer>,
}

impl Pipeline {
    pub fn new(stores: Vec<Box<dyn CorpusStore>>, scorer: Box<dyn SentimentScorer>) -> Self {
        Self { stores, scorer }
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        let lexicon = Arc::new(load_lexicon(config)?);
        let scorer = build_scorer(config.analysis.sentiment, lexicon);
        let stores = open_stores(config).await;
        if stores.is_empty() {
            tracing::warn!("no store could be opened; the corpus will be empty");
        }
        Ok(Self::new(stores, scorer))
    }

    pub fn stores(&self) -> &[Box<dyn CorpusStore>] {
        &self.stores
    }

    pub fn scorer(&self) -> &dyn SentimentScorer {
        self.scorer.as_ref()
    }

    /// Load and enrich the full corpus.
    pub async fn load_enriched(&self) -> LoadedCorpus {
        let mut loaded = load_dataset(&self.stores).await;
        enrich(&mut loaded.data, self.scorer());
        loaded
    }

    /// Run one batch of raw items through the pipeline.
    ///
    /// Callers must not run two ingests against the same stores at once.
    pub async fn ingest(&self, items: &[Value], opts: &IngestOptions) -> Result<IngestSummary> {
        let prepared = prepare_batch(items, opts, Utc::now());
        let (videos, comments) = (prepared.data.videos.len(), prepared.data.comments.len());

        let mut corpus = load_dataset(&self.stores).await.data;
        let (known_videos, known_comments) = (corpus.videos.len(), corpus.comments.len());
        let stats = merge_dataset(&mut corpus, prepared.data);
        let delta = Dataset::new(
            corpus.videos.split_off(known_videos),
            corpus.comments.split_off(known_comments),
        );

        let mut sinks = Vec::new();
        if !opts.dry_run && !delta.is_empty() {
            for store in &self.stores {
                let result = match store.append(&delta).await {
                    Ok(counts) => {
                        tracing::info!(
                            store = store.name(),
                            videos = counts.videos,
                            comments = counts.comments,
                            "appended"
                        );
                        SinkResult {
                            store: store.name().to_string(),
                            written: Some(counts),
                            error: None,
                        }
                    }
                    Err(e) => {
                        tracing::warn!(store = store.name(), error = %format!("{:#}", e), "append failed");
                        SinkResult {
                            store: store.name().to_string(),
                            written: None,
                            error: Some(format!("{:#}", e)),
                        }
                    }
                };
                sinks.push(result);
            }
        }

        Ok(IngestSummary {
            received: prepared.received,
            videos,
            comments,
            skipped_videos: prepared.skipped_videos,
            skipped_comments: prepared.skipped_comments,
            filtered: prepared.filtered,
            new_videos: stats.videos.appended,
            new_comments: stats.comments.appended,
            duplicate_videos: stats.videos.discarded,
            duplicate_comments: stats.comments.discarded,
            dry_run: opts.dry_run,
            sinks,
        })
    }
}

/// Built-in lexicon, extended from `analysis.lexicon_path` when set.
pub fn load_lexicon(config: &Config) -> Result<Lexicon> {
    let mut lexicon = Lexicon::builtin();
    if let Some(path) = &config.analysis.lexicon_path {
        let added = lexicon.extend_from_file(path)?;
        tracing::info!(path = %path.display(), entries = added, "loaded lexicon file");
    }
    Ok(lexicon)
}

/// Parse raw items from a JSON array, a single JSON object, or JSON lines.
pub fn parse_items(content: &str) -> Result<Vec<Value>> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return match value {
            Value::Array(items) => Ok(items),
            Value::Object(_) => Ok(vec![value]),
            _ => bail!("expected a JSON array or object of raw items"),
        };
    }
    trimmed
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("invalid JSON on line {}", i + 1))
        })
        .collect()
}

pub fn parse_since(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", s))
}

/// `pulse ingest <file>`.
pub async fn run_ingest(config: &Config, file: &Path, opts: &IngestOptions) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let items = parse_items(&content).with_context(|| format!("in {}", file.display()))?;

    let pipeline = Pipeline::from_config(config).await?;
    let summary = pipeline.ingest(&items, opts).await?;
    print_summary(&file.display().to_string(), &summary);
    Ok(())
}

/// `pulse scrape`: run the actor, then ingest its dataset.
pub async fn run_scrape(config: &Config, request: &ScrapeRequest, dry_run: bool) -> Result<()> {
    let Some(client) = config.collector().as_ref().and_then(ApifyClient::new) else {
        bail!("collector is not configured: set APIFY_TOKEN or [collector].token");
    };
    if request.inputs.is_empty() {
        bail!("no {} inputs given", request.kind);
    }

    let items = client.scrape(request).await?;
    let opts = IngestOptions {
        extract_comments: request.comments_per_video > 0,
        since: request.since,
        limit: None,
        dry_run,
    };
    let pipeline = Pipeline::from_config(config).await?;
    let summary = pipeline.ingest(&items, &opts).await?;
    let source = format!("{} {}", request.kind, request.inputs.join(","));
    print_summary(&source, &summary);
    Ok(())
}

pub fn print_summary(source: &str, s: &IngestSummary) {
    if s.dry_run {
        println!("ingest {} (dry-run)", source);
    } else {
        println!("ingest {}", source);
    }
    println!("  received: {} items", s.received);
    println!("  normalized: {} videos, {} comments", s.videos, s.comments);
    if s.skipped_videos > 0 || s.skipped_comments > 0 {
        println!(
            "  skipped: {} videos, {} comments",
            s.skipped_videos, s.skipped_comments
        );
    }
    if s.filtered > 0 {
        println!("  filtered: {} videos", s.filtered);
    }
    println!(
        "  new videos: {} (duplicates: {})",
        s.new_videos, s.duplicate_videos
    );
    println!(
        "  new comments: {} (duplicates: {})",
        s.new_comments, s.duplicate_comments
    );
    for sink in &s.sinks {
        match (&sink.written, &sink.error) {
            (Some(w), _) => println!(
                "  {}: wrote {} videos, {} comments",
                sink.store, w.videos, w.comments
            ),
            (None, Some(e)) => println!("  {}: FAILED ({})", sink.store, e),
            (None, None) => {}
        }
    }
    println!("ok");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentiment::SentimentStrategy;
    use crate::store::CacheStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    struct Broken;

    #[async_trait]
    impl CorpusStore for Broken {
        fn name(&self) -> &str {
            "sheets"
        }
        async fn fetch_all(&self) -> Result<Dataset> {
            bail!("connection refused")
        }
        async fn append(&self, _data: &Dataset) -> Result<InsertCounts> {
            bail!("connection refused")
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn scorer() -> Box<dyn SentimentScorer> {
        build_scorer(SentimentStrategy::Compound, Arc::new(Lexicon::builtin()))
    }

    fn items() -> Vec<Value> {
        vec![
            json!({ "id": "1", "text": "love this", "playCount": 100, "diggCount": 10,
                    "createTimeISO": "2024-05-01T00:00:00Z",
                    "comments": [{ "id": "c1", "text": "great" }] }),
            json!({ "id": "2", "text": "old one", "createTimeISO": "2023-01-01T00:00:00Z",
                    "comments": [{ "id": "c2", "text": "meh" }] }),
            json!({ "text": "no id" }),
            json!({ "id": "3", "text": "newest", "createTimeISO": "2024-05-20T00:00:00Z" }),
        ]
    }

    #[test]
    fn test_prepare_batch_filters() {
        let opts = IngestOptions {
            extract_comments: true,
            since: Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            limit: Some(1),
            dry_run: false,
        };
        let batch = prepare_batch(&items(), &opts, now());
        assert_eq!(batch.received, 4);
        assert_eq!(batch.skipped_videos, 1);
        assert_eq!(batch.filtered, 2);
        assert_eq!(batch.data.videos.len(), 1);
        assert_eq!(batch.data.videos[0].id, "1");
        let comment_ids: Vec<&str> = batch.data.comments.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(comment_ids, vec!["c1"]);
    }

    #[tokio::test]
    async fn test_ingest_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let stores: Vec<Box<dyn CorpusStore>> =
            vec![Box::new(CacheStore::new(tmp.path().join("cache.json")))];
        let pipeline = Pipeline::new(stores, scorer());
        let opts = IngestOptions {
            extract_comments: true,
            ..Default::default()
        };

        let first = pipeline.ingest(&items(), &opts).await.unwrap();
        assert_eq!(first.new_videos, 3);
        assert_eq!(first.new_comments, 2);
        assert_eq!(first.sinks[0].written, Some(InsertCounts { videos: 3, comments: 2 }));

        let second = pipeline.ingest(&items(), &opts).await.unwrap();
        assert_eq!(second.new_videos, 0);
        assert_eq!(second.duplicate_videos, 3);
        assert!(second.sinks.is_empty());

        let loaded = pipeline.load_enriched().await;
        assert_eq!(loaded.data.videos.len(), 3);
        assert_eq!(loaded.data.videos[0].engagement_rate, Some(10.0));
        assert!(loaded.data.videos.iter().all(|v| v.sentiment_label.is_some()));
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");
        let stores: Vec<Box<dyn CorpusStore>> = vec![Box::new(CacheStore::new(path.clone()))];
        let pipeline = Pipeline::new(stores, scorer());
        let opts = IngestOptions {
            dry_run: true,
            ..Default::default()
        };
        let summary = pipeline.ingest(&items(), &opts).await.unwrap();
        assert_eq!(summary.new_videos, 3);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unavailable_store_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let cache = CacheStore::new(tmp.path().join("cache.json"));
        cache
            .append(&Dataset::new(
                vec![crate::models::VideoRecord {
                    id: "a".into(),
                    ..Default::default()
                }],
                vec![],
            ))
            .await
            .unwrap();
        let stores: Vec<Box<dyn CorpusStore>> = vec![Box::new(Broken), Box::new(cache)];
        let loaded = load_dataset(&stores).await;
        assert_eq!(loaded.unavailable, vec!["sheets"]);
        assert_eq!(loaded.data.videos.len(), 1);

        let pipeline = Pipeline::new(stores, scorer());
        let summary = pipeline.ingest(&items(), &IngestOptions::default()).await.unwrap();
        assert_eq!(summary.sinks.len(), 2);
        assert!(summary.sinks[0].error.is_some());
        assert_eq!(summary.sinks[1].written.unwrap().videos, 3);
    }

    #[test]
    fn test_parse_items_formats() {
        assert_eq!(parse_items("[{\"id\":1},{\"id\":2}]").unwrap().len(), 2);
        assert_eq!(parse_items("{\"id\":1}").unwrap().len(), 1);
        assert_eq!(parse_items("{\"id\":1}\n\n{\"id\":2}\n").unwrap().len(), 2);
        assert!(parse_items("").unwrap().is_empty());
        assert!(parse_items("{\"id\":1}\nnot json").is_err());
        assert!(parse_items("42").is_err());
    }

    #[test]
    fn test_parse_since() {
        assert_eq!(parse_since("2024-02-03").unwrap(), NaiveDate::from_ymd_opt(2024, 2, 3).unwrap());
        assert!(parse_since("03/02/2024").is_err());
    }
}

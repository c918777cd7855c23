//! Report views over an enriched dataset.
//!
//! A [`Report`] bundles every read-only view the dashboard and the CLI
//! show: headline totals, sentiment distribution, the engagement timeline,
//! top posts, caption and comment keywords, trending hashtags and the
//! creator leaderboard. Used by `pulse report` and `GET /api/report`.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::aggregate::{aggregate_by_time, Bucket, Granularity, TimeSeries, DEFAULT_VIDEO_METRICS};
use crate::config::Config;
use crate::error::PipelineError;
use crate::groups::{filter_dataset, GroupRegistry};
use crate::ingest::Pipeline;
use crate::metrics::{corpus_totals, CorpusTotals};
use crate::models::{format_ts, Dataset, SentimentLabel, VideoRecord};
use crate::rank::{
    caption_word_frequency, comment_word_frequency, creator_leaderboard, hashtag_frequency, top_n,
    CreatorStats,
};

/// Label counts. All three are always present, zero included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SentimentDistribution {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

impl SentimentDistribution {
    pub fn from_labels<I: IntoIterator<Item = Option<SentimentLabel>>>(labels: I) -> Self {
        let mut dist = Self::default();
        for label in labels.into_iter().flatten() {
            match label {
                SentimentLabel::Positive => dist.positive += 1,
                SentimentLabel::Neutral => dist.neutral += 1,
                SentimentLabel::Negative => dist.negative += 1,
            }
        }
        dist
    }

    pub fn total(&self) -> usize {
        self.positive + self.neutral + self.negative
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermCount {
    pub term: String,
    pub count: usize,
}

fn terms(pairs: Vec<(String, usize)>) -> Vec<TermCount> {
    pairs
        .into_iter()
        .map(|(term, count)| TermCount { term, count })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub group: Option<String>,
    pub granularity: Granularity,
    pub top_by: String,
    pub top_n: usize,
    pub keywords: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            group: None,
            granularity: Granularity::Day,
            top_by: "engagement_rate".to_string(),
            top_n: 10,
            keywords: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub granularity: &'static str,
    pub totals: CorpusTotals,
    pub comment_count: usize,
    pub video_sentiment: SentimentDistribution,
    pub comment_sentiment: SentimentDistribution,
    pub timeline: Vec<Bucket>,
    pub top_by: String,
    pub top_posts: Vec<VideoRecord>,
    pub keywords: Vec<TermCount>,
    pub comment_keywords: Vec<TermCount>,
    pub hashtags: Vec<TermCount>,
    pub creators: Vec<CreatorStats>,
}

/// Build every view over an already enriched dataset.
pub fn build_report(
    dataset: &Dataset,
    opts: &ReportOptions,
) -> std::result::Result<Report, PipelineError> {
    // top_n tolerates unknown fields; a report request does not.
    if VideoRecord::default().metric_field(&opts.top_by).is_none() {
        return Err(PipelineError::UnknownField(opts.top_by.clone()));
    }
    let videos = &dataset.videos;
    let timeline = aggregate_by_time(videos, "publish_time", opts.granularity, DEFAULT_VIDEO_METRICS)?;

    Ok(Report {
        group: opts.group.clone(),
        granularity: opts.granularity.as_str(),
        totals: corpus_totals(videos),
        comment_count: dataset.comments.len(),
        video_sentiment: SentimentDistribution::from_labels(videos.iter().map(|v| v.sentiment_label)),
        comment_sentiment: SentimentDistribution::from_labels(
            dataset.comments.iter().map(|c| c.sentiment_label),
        ),
        timeline,
        top_by: opts.top_by.clone(),
        top_posts: top_n(videos, &opts.top_by, opts.top_n)
            .into_iter()
            .cloned()
            .collect(),
        keywords: terms(caption_word_frequency(videos, opts.keywords)),
        comment_keywords: terms(comment_word_frequency(&dataset.comments, opts.keywords)),
        hashtags: terms(hashtag_frequency(videos, opts.keywords)),
        creators: creator_leaderboard(videos, opts.top_n),
    })
}

/// `pulse report`.
pub async fn run_report(config: &Config, opts: &ReportOptions, json: bool) -> Result<()> {
    let pipeline = Pipeline::from_config(config).await?;
    let loaded = pipeline.load_enriched().await;

    let groups = GroupRegistry::from_config(config).await?;
    let data = match &opts.group {
        Some(name) => match groups.find(name) {
            Some(group) => filter_dataset(&loaded.data, group),
            None => bail!("unknown group '{}'", name),
        },
        None => loaded.data,
    };
    let report = build_report(&data, opts)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for name in &loaded.unavailable {
            tracing::warn!(store = %name, "store unavailable, report may be partial");
        }
        print_report(&report);
    }
    Ok(())
}

pub fn print_report(report: &Report) {
    match &report.group {
        Some(group) => println!("TikTok Pulse Report: {}", group),
        None => println!("TikTok Pulse Report"),
    }
    println!("===================");
    println!();

    let t = &report.totals;
    println!("  Videos:      {}", t.videos);
    println!("  Comments:    {}", report.comment_count);
    println!("  Views:       {}", t.views);
    println!("  Likes:       {}", t.likes);
    println!("  Comments:    {} (on videos)", t.comments);
    println!("  Shares:      {}", t.shares);
    match t.saves {
        Some(saves) => println!("  Saves:       {}", saves),
        None => println!("  Saves:       n/a"),
    }
    println!("  Avg engagement: {:.2}%", t.avg_engagement_rate);

    println!();
    println!("  Sentiment:   {:>9} {:>9} {:>9}", "POSITIVE", "NEUTRAL", "NEGATIVE");
    for (name, d) in [
        ("videos", &report.video_sentiment),
        ("comments", &report.comment_sentiment),
    ] {
        println!("  {:<12} {:>9} {:>9} {:>9}", name, d.positive, d.neutral, d.negative);
    }

    if !report.timeline.is_empty() {
        println!();
        println!("  Timeline ({}):", report.granularity);
        println!("  {:<20} {:>6} {:>12} {:>10}", "START", "VIDEOS", "VIEWS", "LIKES");
        println!("  {}", "-".repeat(51));
        for b in &report.timeline {
            println!(
                "  {:<20} {:>6} {:>12} {:>10}",
                format_ts(&b.start),
                b.count,
                b.sums.get("views").copied().unwrap_or(0.0),
                b.sums.get("likes").copied().unwrap_or(0.0),
            );
        }
    }

    if !report.top_posts.is_empty() {
        println!();
        println!("  Top posts by {}:", report.top_by);
        for (i, v) in report.top_posts.iter().enumerate() {
            println!(
                "  {}. [{}] @{} views={} engagement={:.2}% sentiment={}",
                i + 1,
                v.id,
                v.author,
                v.views,
                v.engagement_rate.unwrap_or(0.0),
                v.sentiment_label.map(|l| l.as_str()).unwrap_or("-"),
            );
            if !v.caption.is_empty() {
                println!("     {}", truncate(&v.caption, 80));
            }
        }
    }

    if !report.creators.is_empty() {
        println!();
        println!("  Creators:");
        println!("  {:<24} {:>6} {:>12} {:>10}", "AUTHOR", "VIDEOS", "VIEWS", "ENGAGE %");
        println!("  {}", "-".repeat(55));
        for c in &report.creators {
            println!(
                "  {:<24} {:>6} {:>12} {:>10.2}",
                c.author, c.videos, c.total_views, c.avg_engagement_rate
            );
        }
    }

    print_terms("Trending hashtags", &report.hashtags);
    print_terms("Caption keywords", &report.keywords);
    print_terms("Comment keywords", &report.comment_keywords);
    println!();
}

fn print_terms(title: &str, terms: &[TermCount]) {
    if terms.is_empty() {
        return;
    }
    println!();
    println!("  {}:", title);
    let line: Vec<String> = terms
        .iter()
        .map(|t| format!("{} ({})", t.term, t.count))
        .collect();
    println!("    {}", line.join(", "));
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}...", cut)
    }
}

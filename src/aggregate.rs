//! Temporal aggregation.
//!
//! Groups a corpus into fixed time buckets and sums numeric metrics per
//! bucket. Records whose time field is missing are left out of every
//! bucket (they stay in the corpus). Only non-empty buckets are emitted,
//! in chronological order.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Timelike, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;
use crate::models::{format_ts, CommentRecord, VideoRecord};

pub const DEFAULT_VIDEO_METRICS: &[&str] = &["views", "likes", "comments", "shares", "saves"];
pub const DEFAULT_COMMENT_METRICS: &[&str] = &["likes"];

/// Bucket width. Weeks start on Monday 00:00 UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Granularity {
    Hour,
    #[default]
    Day,
    Week,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Week => "week",
        }
    }

    /// Start of the bucket containing `ts`.
    pub fn truncate(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let date = ts.date_naive();
        match self {
            Granularity::Hour => date
                .and_time(NaiveTime::MIN)
                .and_utc()
                + Duration::hours(i64::from(ts.hour())),
            Granularity::Day => date.and_time(NaiveTime::MIN).and_utc(),
            Granularity::Week => {
                let back = i64::from(date.weekday().num_days_from_monday());
                (date - Duration::days(back)).and_time(NaiveTime::MIN).and_utc()
            }
        }
    }
}

impl FromStr for Granularity {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "hour" | "hourly" | "H" | "h" => Ok(Granularity::Hour),
            "day" | "daily" | "D" | "d" => Ok(Granularity::Day),
            "week" | "weekly" | "W" | "w" => Ok(Granularity::Week),
            other => Err(PipelineError::UnknownField(format!("granularity '{}'", other))),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named field access for records that can be aggregated and ranked.
///
/// The outer `Option` says whether the schema has the field at all; the
/// inner one whether this record carries a value.
pub trait TimeSeries {
    fn time_field(&self, name: &str) -> Option<Option<DateTime<Utc>>>;
    fn metric_field(&self, name: &str) -> Option<Option<f64>>;
}

impl TimeSeries for VideoRecord {
    fn time_field(&self, name: &str) -> Option<Option<DateTime<Utc>>> {
        match name {
            "publish_time" | "publish_date" => Some(self.publish_time),
            "scraped_at" | "timestamp" => Some(self.scraped_at),
            _ => None,
        }
    }

    fn metric_field(&self, name: &str) -> Option<Option<f64>> {
        let value = match name {
            "views" => Some(self.views as f64),
            "likes" => Some(self.likes as f64),
            "comments" => Some(self.comments as f64),
            "shares" => Some(self.shares as f64),
            "saves" => self.saves.map(|s| s as f64),
            "engagement_rate" => self.engagement_rate,
            "sentiment_score" => self.sentiment_score,
            _ => return None,
        };
        Some(value)
    }
}

impl TimeSeries for CommentRecord {
    fn time_field(&self, name: &str) -> Option<Option<DateTime<Utc>>> {
        match name {
            "timestamp" | "date" => Some(self.timestamp),
            "scraped_at" => Some(self.scraped_at),
            _ => None,
        }
    }

    fn metric_field(&self, name: &str) -> Option<Option<f64>> {
        match name {
            "likes" => Some(Some(self.likes as f64)),
            "sentiment_score" => Some(self.sentiment_score),
            _ => None,
        }
    }
}

/// One time bucket of an aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    #[serde(serialize_with = "serialize_start")]
    pub start: DateTime<Utc>,
    pub count: usize,
    pub sums: BTreeMap<String, f64>,
}

fn serialize_start<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_ts(ts))
}

/// Bucket `corpus` by `time_field` at `granularity`, summing `metrics`.
///
/// A metric that no record carries a value for is omitted from every
/// bucket, so "not tracked" stays distinguishable from "zero". An unknown
/// time or metric name is a caller error.
pub fn aggregate_by_time<R: TimeSeries + Default>(
    corpus: &[R],
    time_field: &str,
    granularity: Granularity,
    metrics: &[&str],
) -> Result<Vec<Bucket>, PipelineError> {
    // Field names are checked against the schema, not the data.
    let probe = R::default();
    if probe.time_field(time_field).is_none() {
        return Err(PipelineError::UnknownField(time_field.to_string()));
    }
    if let Some(unknown) = metrics.iter().find(|m| probe.metric_field(m).is_none()) {
        return Err(PipelineError::UnknownField(unknown.to_string()));
    }

    let tracked: Vec<&str> = metrics
        .iter()
        .copied()
        .filter(|m| corpus.iter().any(|r| matches!(r.metric_field(m), Some(Some(_)))))
        .collect();

    let mut buckets: BTreeMap<DateTime<Utc>, Bucket> = BTreeMap::new();
    let mut skipped = 0usize;
    for record in corpus {
        let Some(Some(ts)) = record.time_field(time_field) else {
            skipped += 1;
            continue;
        };
        let start = granularity.truncate(ts);
        let bucket = buckets.entry(start).or_insert_with(|| Bucket {
            start,
            count: 0,
            sums: tracked.iter().map(|m| (m.to_string(), 0.0)).collect(),
        });
        bucket.count += 1;
        for metric in &tracked {
            if let Some(Some(v)) = record.metric_field(metric) {
                if let Some(sum) = bucket.sums.get_mut(*metric) {
                    *sum += v;
                }
            }
        }
    }

    if skipped > 0 {
        tracing::debug!(skipped, field = time_field, "records without timestamp left out of aggregate");
    }
    Ok(buckets.into_values().collect())
}

//! Apify actor client for the TikTok scraper.
//!
//! Starts an actor run, long-polls it to completion and downloads the
//! run's default dataset as raw JSON items. The items are opaque here:
//! they go straight to [`crate::ingest`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::config::CollectorConfig;

const DEFAULT_RESULTS: u32 = 100;

pub type Result<T> = std::result::Result<T, CollectorError>;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Run failed with status: {0}")]
    RunFailed(String),

    #[error("Run {0} did not finish within {1}s")]
    Timeout(String, u64),
}

impl From<reqwest::Error> for CollectorError {
    fn from(err: reqwest::Error) -> Self {
        CollectorError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for CollectorError {
    fn from(err: serde_json::Error) -> Self {
        CollectorError::Parse(err.to_string())
    }
}

/// Wrapper for Apify API responses.
#[derive(Debug, Clone, Deserialize)]
struct ApiResponse<T> {
    data: T,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunData {
    pub id: String,
    pub status: String,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
}

/// What the scraper should look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeKind {
    Hashtag,
    User,
    Search,
}

impl ScrapeKind {
    /// Actor input key carrying the targets.
    fn input_key(&self) -> &'static str {
        match self {
            ScrapeKind::Hashtag => "hashtags",
            ScrapeKind::User => "profiles",
            ScrapeKind::Search => "searchQueries",
        }
    }
}

impl FromStr for ScrapeKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hashtag" | "hashtags" => Ok(ScrapeKind::Hashtag),
            "user" | "users" | "profile" => Ok(ScrapeKind::User),
            "search" | "keyword" => Ok(ScrapeKind::Search),
            other => Err(format!(
                "unknown scrape kind '{}': use hashtag, user, or search",
                other
            )),
        }
    }
}

impl fmt::Display for ScrapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScrapeKind::Hashtag => "hashtag",
            ScrapeKind::User => "user",
            ScrapeKind::Search => "search",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScrapeRequest {
    pub kind: ScrapeKind,
    pub inputs: Vec<String>,
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default)]
    pub comments_per_video: u32,
    /// `YYYY-MM-DD`; older videos are dropped at ingest.
    #[serde(default)]
    pub since: Option<NaiveDate>,
}

impl ScrapeRequest {
    /// Split comma-separated targets, dropping `#`/`@` prefixes.
    pub fn parse_inputs(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(|s| s.trim().trim_start_matches(['#', '@']).to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn actor_input(&self) -> Value {
        let mut input = json!({
            "resultsPerPage": self.count.unwrap_or(DEFAULT_RESULTS),
            "shouldDownloadVideos": false,
            "commentsPerVideo": self.comments_per_video,
        });
        input[self.kind.input_key()] = json!(self.inputs);
        input
    }
}

pub struct ApifyClient {
    client: reqwest::Client,
    token: String,
    api_base: String,
    actor_id: String,
    timeout: Duration,
}

impl ApifyClient {
    /// Returns `None` when the config carries no token.
    pub fn new(config: &CollectorConfig) -> Option<Self> {
        let token = config.token.clone()?;
        Some(Self {
            client: reqwest::Client::new(),
            token,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            actor_id: config.actor_id.replace('/', "~"),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CollectorError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(resp)
    }

    /// Start an actor run. Returns immediately with run metadata.
    pub async fn start_run(&self, input: &Value) -> Result<RunData> {
        let url = format!("{}/acts/{}/runs", self.api_base, self.actor_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(input)
            .send()
            .await?;

        let api_resp: ApiResponse<RunData> = Self::check(resp).await?.json().await?;
        Ok(api_resp.data)
    }

    /// Poll until a run completes. Uses `waitForFinish=60` for long-polling,
    /// bounded overall by the configured timeout.
    pub async fn wait_for_run(&self, run_id: &str) -> Result<RunData> {
        let secs = self.timeout.as_secs();
        tokio::time::timeout(self.timeout, self.poll_run(run_id))
            .await
            .map_err(|_| CollectorError::Timeout(run_id.to_string(), secs))?
    }

    async fn poll_run(&self, run_id: &str) -> Result<RunData> {
        loop {
            let url = format!("{}/actor-runs/{}?waitForFinish=60", self.api_base, run_id);
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await?;

            let api_resp: ApiResponse<RunData> = Self::check(resp).await?.json().await?;
            match api_resp.data.status.as_str() {
                "SUCCEEDED" => return Ok(api_resp.data),
                "FAILED" | "ABORTED" | "TIMED-OUT" => {
                    return Err(CollectorError::RunFailed(api_resp.data.status));
                }
                _ => {
                    tracing::debug!(run_id, status = %api_resp.data.status, "Run still in progress");
                    continue;
                }
            }
        }
    }

    /// Fetch every item of a dataset as raw JSON.
    pub async fn get_dataset_items(&self, dataset_id: &str) -> Result<Vec<Value>> {
        let url = format!("{}/datasets/{}/items?format=json", self.api_base, dataset_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let body = Self::check(resp).await?.text().await?;
        match serde_json::from_str::<Value>(&body)? {
            Value::Array(items) => Ok(items),
            other => Err(CollectorError::Parse(format!(
                "expected an array of items, got {}",
                if other.is_object() { "an object" } else { "a scalar" }
            ))),
        }
    }

    /// Start run, wait, fetch results.
    pub async fn scrape(&self, request: &ScrapeRequest) -> Result<Vec<Value>> {
        tracing::info!(
            kind = %request.kind,
            inputs = ?request.inputs,
            count = request.count.unwrap_or(DEFAULT_RESULTS),
            "Starting TikTok scrape"
        );

        let run = self.start_run(&request.actor_input()).await?;
        tracing::info!(run_id = %run.id, "Apify run started, polling for completion");

        let completed = self.wait_for_run(&run.id).await?;
        tracing::info!(
            run_id = %completed.id,
            dataset_id = %completed.default_dataset_id,
            "Run completed, fetching results"
        );

        let items = self.get_dataset_items(&completed.default_dataset_id).await?;
        tracing::info!(count = items.len(), "Fetched dataset items");
        Ok(items)
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::aggregate::Granularity;
use crate::groups::KeywordGroup;
use crate::sentiment::SentimentStrategy;

pub const STORE_CACHE: &str = "cache";
pub const STORE_SQLITE: &str = "sqlite";
pub const STORE_SHEETS: &str = "sheets";
const KNOWN_STORES: &[&str] = &[STORE_CACHE, STORE_SQLITE, STORE_SHEETS];

pub const SHEETS_TOKEN_ENV: &str = "PULSE_SHEETS_TOKEN";
pub const APIFY_TOKEN_ENV: &str = "APIFY_TOKEN";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub sheets: Option<SheetsConfig>,
    #[serde(default)]
    pub collector: Option<CollectorConfig>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub groups: Vec<KeywordGroup>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/pulse.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    /// Keyword groups saved through the API. Replaces `[[groups]]` once
    /// written.
    #[serde(default = "default_groups_path")]
    pub groups_path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            groups_path: default_groups_path(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("./data/data_cache.json")
}

fn default_groups_path() -> PathBuf {
    PathBuf::from("./data/groups.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct MergeConfig {
    /// Stores read in this order when loading the corpus. The first store
    /// to provide a record wins.
    #[serde(default = "default_source_priority")]
    pub source_priority: Vec<String>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            source_priority: default_source_priority(),
        }
    }
}

fn default_source_priority() -> Vec<String> {
    vec![
        STORE_CACHE.to_string(),
        STORE_SQLITE.to_string(),
        STORE_SHEETS.to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub sentiment: SentimentStrategy,
    #[serde(default = "default_granularity")]
    pub granularity: String,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_keywords")]
    pub keywords: usize,
    /// Optional VADER-format lexicon layered over the built-in table.
    #[serde(default)]
    pub lexicon_path: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sentiment: SentimentStrategy::default(),
            granularity: default_granularity(),
            top_n: default_top_n(),
            keywords: default_keywords(),
            lexicon_path: None,
        }
    }
}

fn default_granularity() -> String {
    "day".to_string()
}
fn default_top_n() -> usize {
    10
}
fn default_keywords() -> usize {
    20
}

impl AnalysisConfig {
    pub fn granularity(&self) -> Result<Granularity> {
        self.granularity
            .parse()
            .with_context(|| format!("analysis.granularity: '{}'", self.granularity))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_videos_range")]
    pub videos_range: String,
    #[serde(default = "default_comments_range")]
    pub comments_range: String,
    #[serde(default = "default_sheets_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_videos_range() -> String {
    "Videos!A:N".to_string()
}
fn default_comments_range() -> String {
    "Comments!A:G".to_string()
}
fn default_sheets_api_base() -> String {
    "https://sheets.googleapis.com/v4/spreadsheets".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_actor_id")]
    pub actor_id: String,
    #[serde(default = "default_apify_api_base")]
    pub api_base: String,
    /// Upper bound on waiting for one actor run.
    #[serde(default = "default_collector_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            token: None,
            actor_id: default_actor_id(),
            api_base: default_apify_api_base(),
            timeout_secs: default_collector_timeout_secs(),
        }
    }
}

fn default_actor_id() -> String {
    "clockworks~tiktok-scraper".to_string()
}
fn default_apify_api_base() -> String {
    "https://api.apify.com/v2".to_string()
}
fn default_collector_timeout_secs() -> u64 {
    900
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8001".to_string()
}

impl Config {
    /// Defaults only, for commands that can run without a config file.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig::default(),
            cache: CacheConfig::default(),
            merge: MergeConfig::default(),
            analysis: AnalysisConfig::default(),
            sheets: None,
            collector: None,
            server: ServerConfig::default(),
            groups: Vec::new(),
        }
    }

    /// Bearer token for the spreadsheet store; the environment wins.
    pub fn sheets_token(&self) -> Option<String> {
        std::env::var(SHEETS_TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.sheets.as_ref().and_then(|s| s.access_token.clone()))
    }

    /// Collector settings with the token resolved from the environment
    /// when the config file has none. `None` when no token is available.
    pub fn collector(&self) -> Option<CollectorConfig> {
        let mut collector = self.collector.clone().unwrap_or_default();
        if let Ok(token) = std::env::var(APIFY_TOKEN_ENV) {
            if !token.is_empty() {
                collector.token = Some(token);
            }
        }
        collector.token.as_ref()?;
        Some(collector)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate merge priority
    if config.merge.source_priority.is_empty() {
        anyhow::bail!("merge.source_priority must list at least one store");
    }
    for (i, name) in config.merge.source_priority.iter().enumerate() {
        if !KNOWN_STORES.contains(&name.as_str()) {
            anyhow::bail!(
                "Unknown store in merge.source_priority: '{}'. Must be cache, sqlite, or sheets.",
                name
            );
        }
        if config.merge.source_priority[..i].contains(name) {
            anyhow::bail!("merge.source_priority lists '{}' twice", name);
        }
    }

    // Validate analysis
    if config.analysis.top_n < 1 {
        anyhow::bail!("analysis.top_n must be >= 1");
    }
    if config.analysis.keywords < 1 {
        anyhow::bail!("analysis.keywords must be >= 1");
    }
    config.analysis.granularity()?;

    // Validate groups
    for (i, group) in config.groups.iter().enumerate() {
        if group.name.trim().is_empty() {
            anyhow::bail!("groups[{}].name must not be empty", i);
        }
        if config.groups[..i].iter().any(|g| g.name == group.name) {
            anyhow::bail!("Duplicate group name: '{}'", group.name);
        }
    }

    if let Some(sheets) = &config.sheets {
        if sheets.spreadsheet_id.trim().is_empty() {
            anyhow::bail!("sheets.spreadsheet_id must not be empty");
        }
    } else if config.merge.source_priority.iter().any(|s| s == STORE_SHEETS) {
        tracing::warn!("'sheets' is in merge.source_priority but [sheets] is not configured; skipping it");
    }

    Ok(config)
}

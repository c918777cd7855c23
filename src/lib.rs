//! # TikTok Pulse
//!
//! Ingestion, deduplication and engagement analytics for short-video
//! social data.
//!
//! Raw scraper items are normalized into a canonical record schema,
//! merged first-seen-wins across several stores (JSON cache, SQLite,
//! Google Sheets), enriched with engagement rates and sentiment, and
//! exposed as time-bucketed, ranked and keyword views through a CLI and
//! an HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────────────┐   ┌──────────────────┐
//! │ Collector │──▶│ Normalize + Merge │──▶│ Stores           │
//! │ (Apify)   │   │                   │   │ cache/sqlite/    │
//! └───────────┘   └───────────────────┘   │ sheets           │
//!                                         └────────┬─────────┘
//!                    ┌─────────────────────────────┤
//!                    ▼                             ▼
//!          ┌───────────────────┐           ┌──────────────┐
//!          │ Metrics+Sentiment │──────────▶│ CLI / HTTP   │
//!          │ Aggregate + Rank  │           │ (pulse)      │
//!          └───────────────────┘           └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pulse init                             # create the database
//! pulse ingest ./dataset.json --comments # ingest a scraper export
//! pulse report --granularity week
//! pulse serve                            # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Canonical records and the [`models::Dataset`] pair |
//! | [`normalize`] | Raw item → canonical record mapping |
//! | [`merge`] | First-seen-wins deduplicating merge |
//! | [`metrics`] | Engagement rate and corpus totals |
//! | [`sentiment`] | Polarity and compound sentiment scorers |
//! | [`aggregate`] | Time-bucketed metric sums |
//! | [`rank`] | Top-N, word, hashtag and creator rankings |
//! | [`groups`] | Keyword group filters |
//! | [`report`] | Bundled report views |
//! | [`store`] | Cache, SQLite and Sheets stores |
//! | [`collector`] | Apify actor client |
//! | [`ingest`] | Ingest and load orchestration |
//! | [`server`] | HTTP API |
//! | [`config`] | TOML configuration parsing |
//! | [`db`] / [`migrate`] | SQLite connection and schema |

pub mod aggregate;
pub mod collector;
pub mod config;
pub mod db;
pub mod error;
pub mod groups;
pub mod ingest;
pub mod merge;
pub mod metrics;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod rank;
pub mod report;
pub mod sentiment;
pub mod server;
pub mod sources;
pub mod store;

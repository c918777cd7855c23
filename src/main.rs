//! # TikTok Pulse CLI (`pulse`)
//!
//! ## Usage
//!
//! ```bash
//! pulse --config ./config/pulse.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pulse init` | Create the SQLite database and schema |
//! | `pulse sources` | List stores and their health |
//! | `pulse ingest <file>` | Ingest raw scraper items from a JSON / JSON-lines file |
//! | `pulse report` | Print the engagement report |
//! | `pulse scrape <kind> <inputs>` | Run the Apify scraper and ingest the results |
//! | `pulse serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! pulse ingest ./exports/dataset.json --comments --since 2024-01-01
//! pulse report --group food --granularity week --top-by views
//! pulse scrape hashtag "food,recipes" --count 50 --comments 20
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tiktok_pulse::collector::{ScrapeKind, ScrapeRequest};
use tiktok_pulse::config;
use tiktok_pulse::ingest::{self, IngestOptions};
use tiktok_pulse::migrate;
use tiktok_pulse::report::{self, ReportOptions};
use tiktok_pulse::server;
use tiktok_pulse::sources;

/// TikTok Pulse: cross-source ingestion, deduplication and engagement
/// analytics for short-video data.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pulse.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "pulse", about = "TikTok engagement ingestion and analytics", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "./config/pulse.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite file if needed. Safe to run repeatedly.
    Init,

    /// List configured stores and their health status.
    Sources,

    /// Ingest raw scraper items from a file.
    ///
    /// Accepts a JSON array, a single JSON object, or JSON lines. Items are
    /// normalized, deduplicated against the known corpus, and appended to
    /// every store.
    Ingest {
        /// Path to the items file.
        file: PathBuf,

        /// Also ingest the comment threads nested in each item.
        #[arg(long)]
        comments: bool,

        /// Only accept videos published on or after this date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Maximum number of videos to accept from the file.
        #[arg(long)]
        limit: Option<usize>,

        /// Show what would be ingested without writing to any store.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the engagement report over the merged corpus.
    Report {
        /// Restrict to a keyword group from `[[groups]]`.
        #[arg(long)]
        group: Option<String>,

        /// Timeline bucket size: `hour`, `day`, or `week`.
        #[arg(long)]
        granularity: Option<String>,

        /// Field to rank top posts by (e.g. `views`, `likes`, `engagement_rate`).
        #[arg(long, default_value = "engagement_rate")]
        top_by: String,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run the Apify TikTok scraper and ingest its results.
    ///
    /// Requires `APIFY_TOKEN` or `[collector].token`.
    Scrape {
        /// What to scrape: `hashtag`, `user`, or `search`.
        kind: ScrapeKind,

        /// Comma-separated hashtags, usernames, or search queries.
        inputs: String,

        /// Results per input.
        #[arg(long)]
        count: Option<u32>,

        /// Comments to fetch per video (0 to skip comments).
        #[arg(long, default_value_t = 0)]
        comments: u32,

        /// Only keep videos published on or after this date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Scrape and normalize without writing to any store.
        #[arg(long)]
        dry_run: bool,
    },

    /// Start the HTTP API.
    ///
    /// Binds to the address configured in `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tiktok_pulse=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg).await?;
        }
        Commands::Ingest {
            file,
            comments,
            since,
            limit,
            dry_run,
        } => {
            let opts = IngestOptions {
                extract_comments: comments,
                since: since.as_deref().map(ingest::parse_since).transpose()?,
                limit,
                dry_run,
            };
            ingest::run_ingest(&cfg, &file, &opts).await?;
        }
        Commands::Report {
            group,
            granularity,
            top_by,
            json,
        } => {
            let granularity = match granularity {
                Some(g) => g.parse()?,
                None => cfg.analysis.granularity()?,
            };
            let opts = ReportOptions {
                group,
                granularity,
                top_by,
                top_n: cfg.analysis.top_n,
                keywords: cfg.analysis.keywords,
            };
            report::run_report(&cfg, &opts, json).await?;
        }
        Commands::Scrape {
            kind,
            inputs,
            count,
            comments,
            since,
            dry_run,
        } => {
            let request = ScrapeRequest {
                kind,
                inputs: ScrapeRequest::parse_inputs(&inputs),
                count,
                comments_per_video: comments,
                since: since.as_deref().map(ingest::parse_since).transpose()?,
            };
            ingest::run_scrape(&cfg, &request, dry_run).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn pulse_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("pulse");
    path
}

const ITEMS: &str = r#"[
  {
    "id": "7001",
    "text": "Best pasta recipe ever #food #recipe @chef",
    "authorMeta": { "name": "chef" },
    "diggCount": 100, "commentCount": 10, "shareCount": 5, "collectCount": 3, "playCount": 1000,
    "createTimeISO": "2024-03-01T10:00:00Z",
    "comments": [
      { "cid": "c1", "text": "I love this, amazing", "uniqueId": "fan1", "diggCount": 2,
        "createTimeISO": "2024-03-02T00:00:00Z" }
    ]
  },
  {
    "id": 7002,
    "text": "Terrible burnt toast #food",
    "authorMeta": { "name": "baker" },
    "diggCount": 5, "playCount": 500,
    "createTimeISO": "2024-03-05T08:30:00Z"
  },
  {
    "id": "7003",
    "text": "Gym routine #fitness",
    "authorMeta": { "name": "coach" },
    "diggCount": 20, "playCount": 0,
    "createTimeISO": "2023-12-01T12:00:00Z"
  },
  { "text": "no identifier at all" }
]"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();
    fs::write(root.join("items.json"), ITEMS).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/pulse.sqlite"

[cache]
path = "{root}/data/cache.json"
groups_path = "{root}/data/groups.json"

[merge]
source_priority = ["cache", "sqlite"]

[analysis]
sentiment = "compound"
granularity = "day"
top_n = 5

[server]
bind = "127.0.0.1:8911"

[[groups]]
name = "food"
keywords = ["food", "recipe"]
exclude_keywords = ["sponsored"]
"#,
        root = root.display()
    );

    let config_path = config_dir.join("pulse.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_pulse(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = pulse_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("APIFY_TOKEN")
        .env_remove("PULSE_SHEETS_TOKEN")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run pulse binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn items_path(config_path: &Path) -> String {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("items.json")
        .display()
        .to_string()
}

fn ingest_all(config_path: &Path) {
    let items = items_path(config_path);
    let (stdout, stderr, success) = run_pulse(config_path, &["ingest", &items, "--comments"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
}

fn report_json(config_path: &Path, extra: &[&str]) -> Value {
    let mut args = vec!["report", "--json"];
    args.extend_from_slice(extra);
    let (stdout, stderr, success) = run_pulse(config_path, &args);
    assert!(success, "report failed: stdout={}, stderr={}", stdout, stderr);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("report is not JSON ({}): {}", e, stdout))
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_pulse(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, again) = run_pulse(&config_path, &["init"]);
    assert!(again, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_file() {
    let (_tmp, config_path) = setup_test_env();
    let items = items_path(&config_path);

    let (stdout, stderr, success) = run_pulse(&config_path, &["ingest", &items, "--comments"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("received: 4 items"), "{}", stdout);
    assert!(stdout.contains("normalized: 3 videos, 1 comments"), "{}", stdout);
    assert!(stdout.contains("skipped: 1 videos, 0 comments"), "{}", stdout);
    assert!(stdout.contains("new videos: 3 (duplicates: 0)"), "{}", stdout);
    assert!(stdout.contains("cache: wrote 3 videos, 1 comments"), "{}", stdout);
    assert!(stdout.contains("sqlite: wrote 3 videos, 1 comments"), "{}", stdout);
    assert!(stdout.trim_end().ends_with("ok"));
}

#[test]
fn test_ingest_idempotent_no_duplicates() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);

    let items = items_path(&config_path);
    let (stdout, _, success) = run_pulse(&config_path, &["ingest", &items, "--comments"]);
    assert!(success);
    assert!(stdout.contains("new videos: 0 (duplicates: 3)"), "{}", stdout);
    assert!(stdout.contains("new comments: 0 (duplicates: 1)"), "{}", stdout);
    assert!(!stdout.contains("wrote"));

    let report = report_json(&config_path, &[]);
    assert_eq!(report["totals"]["videos"], 3);
    assert_eq!(report["comment_count"], 1);
}

#[test]
fn test_ingest_dry_run() {
    let (_tmp, config_path) = setup_test_env();
    let items = items_path(&config_path);

    let (stdout, _, success) = run_pulse(&config_path, &["ingest", &items, "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("(dry-run)"));
    assert!(stdout.contains("new videos: 3"));

    let report = report_json(&config_path, &[]);
    assert_eq!(report["totals"]["videos"], 0);
}

#[test]
fn test_ingest_since_and_limit() {
    let (_tmp, config_path) = setup_test_env();
    let items = items_path(&config_path);

    let (stdout, _, success) = run_pulse(
        &config_path,
        &["ingest", &items, "--since", "2024-01-01", "--limit", "1"],
    );
    assert!(success, "{}", stdout);
    assert!(stdout.contains("filtered: 2 videos"), "{}", stdout);
    assert!(stdout.contains("new videos: 1 (duplicates: 0)"), "{}", stdout);

    let report = report_json(&config_path, &[]);
    assert_eq!(report["top_posts"][0]["id"], "7001");
}

#[test]
fn test_ingest_invalid_since() {
    let (_tmp, config_path) = setup_test_env();
    let items = items_path(&config_path);

    let (_, stderr, success) = run_pulse(&config_path, &["ingest", &items, "--since", "March"]);
    assert!(!success);
    assert!(stderr.contains("invalid date"), "{}", stderr);
}

#[test]
fn test_ingest_json_lines() {
    let (tmp, config_path) = setup_test_env();
    let path = tmp.path().join("items.jsonl");
    fs::write(
        &path,
        "{\"id\":\"a1\",\"text\":\"one\",\"playCount\":10}\n\n{\"id\":\"a2\",\"text\":\"two\"}\n",
    )
    .unwrap();

    let (stdout, _, success) = run_pulse(&config_path, &["ingest", path.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("new videos: 2"), "{}", stdout);
}

#[test]
fn test_report_views() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);

    let report = report_json(&config_path, &[]);
    assert_eq!(report["totals"]["views"], 1500);
    assert_eq!(report["totals"]["saves"], 3);
    assert_eq!(report["top_by"], "engagement_rate");
    // Zero views floor to one.
    assert_eq!(report["top_posts"][0]["id"], "7003");
    assert_eq!(report["top_posts"][0]["engagement_rate"], 2000.0);
    assert_eq!(report["hashtags"][0]["term"], "food");
    assert_eq!(report["hashtags"][0]["count"], 2);

    let sentiment = &report["video_sentiment"];
    let total = sentiment["positive"].as_u64().unwrap()
        + sentiment["neutral"].as_u64().unwrap()
        + sentiment["negative"].as_u64().unwrap();
    assert_eq!(total, 3);
}

#[test]
fn test_report_weekly_timeline() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);

    let report = report_json(&config_path, &["--granularity", "week", "--top-by", "views"]);
    assert_eq!(report["granularity"], "week");
    let timeline = report["timeline"].as_array().unwrap();
    assert_eq!(timeline.len(), 3);
    assert_eq!(timeline[0]["start"], "2023-11-27 00:00:00");
    assert_eq!(report["top_posts"][0]["id"], "7001");
}

#[test]
fn test_report_group() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);

    let report = report_json(&config_path, &["--group", "FOOD"]);
    assert_eq!(report["group"], "FOOD");
    assert_eq!(report["totals"]["videos"], 2);
    assert_eq!(report["comment_count"], 1);

    let (_, stderr, success) = run_pulse(&config_path, &["report", "--group", "travel"]);
    assert!(!success);
    assert!(stderr.contains("unknown group"), "{}", stderr);
}

#[test]
fn test_report_unknown_field() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);

    let (_, stderr, success) = run_pulse(&config_path, &["report", "--top-by", "plays"]);
    assert!(!success);
    assert!(stderr.contains("unknown field"), "{}", stderr);
}

#[test]
fn test_report_text() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);

    let (stdout, stderr, success) = run_pulse(&config_path, &["report"]);
    assert!(success, "report failed: {}", stderr);
    assert!(stdout.contains("TikTok Pulse Report"));
    assert!(stdout.contains("Videos:      3"), "{}", stdout);
}

#[test]
fn test_report_warns_on_unavailable_store() {
    let (tmp, config_path) = setup_test_env();
    ingest_all(&config_path);
    fs::write(tmp.path().join("data").join("cache.json"), "{ not json").unwrap();

    let (stdout, stderr, success) = run_pulse(&config_path, &["report"]);
    assert!(success, "report failed: {}", stderr);
    assert!(stderr.contains("report may be partial"), "{}", stderr);
    assert!(stderr.contains("cache"), "{}", stderr);
    assert!(!stdout.contains("partial"), "{}", stdout);
    // sqlite still holds the corpus.
    assert!(stdout.contains("Videos:      3"), "{}", stdout);
}

#[test]
fn test_sources() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_pulse(&config_path, &["sources"]);
    assert!(success, "sources failed: {}", stderr);
    assert!(stdout.contains("HEALTHY"));
    assert!(stdout.contains("cache"));
    assert!(stdout.contains("sqlite"));
    assert!(stdout.contains("NOT CONFIGURED"));
}

#[test]
fn test_scrape_requires_token() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_pulse(&config_path, &["scrape", "hashtag", "food"]);
    assert!(!success);
    assert!(stderr.contains("collector is not configured"), "{}", stderr);
}

#[test]
fn test_unknown_scrape_kind() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success) = run_pulse(&config_path, &["scrape", "video", "food"]);
    assert!(!success);
}

#[test]
fn test_missing_config() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_pulse(&tmp.path().join("nope.toml"), &["sources"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

//! HTTP API for the dashboard and for scraper callbacks.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/health` | Health check (version, open stores) |
//! | `GET`  | `/api/groups` | Keyword groups |
//! | `POST` | `/api/groups` | Create or replace a group by name |
//! | `DELETE` | `/api/groups/{name}` | Delete a group |
//! | `GET`  | `/api/data[?group=]` | Enriched videos and comments |
//! | `GET`  | `/api/report[?group=&granularity=&top_by=&top_n=]` | Report views |
//! | `POST` | `/api/ingest` | Ingest raw items from the request body |
//! | `POST` | `/api/scrape` | Start a background scrape job (202) |
//! | `GET`  | `/api/jobs/{id}` | Scrape job status |
//! | `POST` | `/api/webhooks/apify` | Ingest a finished actor run's dataset |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "unknown field: 'plays'" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `collector_disabled` (400),
//! `upstream_error` (502), `internal` (500).
//!
//! Ingestion (direct, webhook or job) is serialized by one ingest lock;
//! the read endpoints never take it.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::aggregate::Granularity;
use crate::collector::{ApifyClient, ScrapeRequest};
use crate::config::Config;
use crate::error::PipelineError;
use crate::groups::{filter_dataset, find_group, GroupRegistry, KeywordGroup};
use crate::ingest::{IngestOptions, IngestSummary, Pipeline};
use crate::models::Dataset;
use crate::report::{build_report, Report, ReportOptions};

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pipeline: Arc<Pipeline>,
    /// Held for the whole load-merge-append cycle of one ingest.
    ingest_lock: Arc<Mutex<()>>,
    jobs: Arc<RwLock<HashMap<Uuid, JobStatus>>>,
    groups: Arc<RwLock<GroupRegistry>>,
}

/// Starts the HTTP server on `[server].bind`. Runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pipeline = Pipeline::from_config(config).await?;
    let groups = GroupRegistry::from_config(config).await?;
    tracing::info!(
        path = %groups.path().display(),
        groups = groups.groups().len(),
        "groups loaded"
    );
    let stores: Vec<&str> = pipeline.stores().iter().map(|s| s.name()).collect();
    tracing::info!(?stores, scorer = pipeline.scorer().name(), "pipeline ready");

    let state = AppState {
        config: Arc::new(config.clone()),
        pipeline: Arc::new(pipeline),
        ingest_lock: Arc::new(Mutex::new(())),
        jobs: Arc::new(RwLock::new(HashMap::new())),
        groups: Arc::new(RwLock::new(groups)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/groups", get(handle_groups).post(handle_upsert_group))
        .route("/api/groups/{name}", delete(handle_delete_group))
        .route("/api/data", get(handle_data))
        .route("/api/report", get(handle_report))
        .route("/api/ingest", post(handle_ingest))
        .route("/api/scrape", post(handle_scrape))
        .route("/api/jobs/{id}", get(handle_job))
        .route("/api/webhooks/apify", post(handle_apify_webhook))
        .layer(cors)
        .with_state(state);

    tracing::info!(addr = %bind_addr, "listening");
    println!("pulse server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::UnknownField(_) => bad_request(err.to_string()),
            other => internal(other.to_string()),
        }
    }
}

fn app_error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    app_error(StatusCode::NOT_FOUND, "not_found", message)
}

fn internal(message: impl Into<String>) -> AppError {
    app_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

fn collector_client(config: &Config) -> Result<ApifyClient, AppError> {
    config
        .collector()
        .as_ref()
        .and_then(ApifyClient::new)
        .ok_or_else(|| {
            app_error(
                StatusCode::BAD_REQUEST,
                "collector_disabled",
                "collector is not configured (set APIFY_TOKEN)",
            )
        })
}

/// Resolve an optional group name against the configured groups.
fn resolve_group<'a>(
    groups: &'a [KeywordGroup],
    name: Option<&str>,
) -> Result<Option<&'a KeywordGroup>, AppError> {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => find_group(groups, name)
            .map(Some)
            .ok_or_else(|| not_found(format!("unknown group '{}'", name))),
        None => Ok(None),
    }
}

// ============ GET /api/health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    stores: Vec<String>,
    collector: bool,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        stores: state
            .pipeline
            .stores()
            .iter()
            .map(|s| s.name().to_string())
            .collect(),
        collector: state.config.collector().is_some(),
    })
}

// ============ /api/groups ============

#[derive(Debug, Serialize)]
struct GroupsResponse {
    groups: Vec<KeywordGroup>,
}

async fn handle_groups(State(state): State<AppState>) -> Json<GroupsResponse> {
    Json(GroupsResponse {
        groups: state.groups.read().await.groups().to_vec(),
    })
}

async fn handle_upsert_group(
    State(state): State<AppState>,
    Json(group): Json<KeywordGroup>,
) -> Result<Json<GroupsResponse>, AppError> {
    if group.name.trim().is_empty() {
        return Err(bad_request("group name must not be empty"));
    }
    let mut registry = state.groups.write().await;
    registry
        .upsert(group)
        .await
        .map_err(|e| internal(format!("{:#}", e)))?;
    Ok(Json(GroupsResponse {
        groups: registry.groups().to_vec(),
    }))
}

async fn handle_delete_group(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<GroupsResponse>, AppError> {
    let mut registry = state.groups.write().await;
    let removed = registry
        .remove(&name)
        .await
        .map_err(|e| internal(format!("{:#}", e)))?;
    if !removed {
        return Err(not_found(format!("unknown group '{}'", name)));
    }
    Ok(Json(GroupsResponse {
        groups: registry.groups().to_vec(),
    }))
}

/// Clone the named group out of the registry so no lock is held while
/// the corpus loads.
async fn lookup_group(
    state: &AppState,
    name: Option<&str>,
) -> Result<Option<KeywordGroup>, AppError> {
    let registry = state.groups.read().await;
    Ok(resolve_group(registry.groups(), name)?.cloned())
}

// ============ GET /api/data ============

#[derive(Deserialize)]
struct DataQuery {
    group: Option<String>,
}

#[derive(Serialize)]
struct DataResponse {
    #[serde(flatten)]
    data: Dataset,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    unavailable: Vec<String>,
}

async fn handle_data(
    State(state): State<AppState>,
    Query(query): Query<DataQuery>,
) -> Result<Json<DataResponse>, AppError> {
    let group = lookup_group(&state, query.group.as_deref()).await?;
    let loaded = state.pipeline.load_enriched().await;
    let data = match &group {
        Some(group) => filter_dataset(&loaded.data, group),
        None => loaded.data,
    };
    Ok(Json(DataResponse {
        data,
        unavailable: loaded.unavailable,
    }))
}

// ============ GET /api/report ============

#[derive(Deserialize)]
struct ReportQuery {
    group: Option<String>,
    granularity: Option<String>,
    top_by: Option<String>,
    top_n: Option<usize>,
}

async fn handle_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<Report>, AppError> {
    let config = &state.config;
    let group = lookup_group(&state, query.group.as_deref()).await?;

    let granularity = match &query.granularity {
        Some(g) => g.parse::<Granularity>()?,
        None => config
            .analysis
            .granularity()
            .map_err(|e| internal(e.to_string()))?,
    };
    let opts = ReportOptions {
        group: group.as_ref().map(|g| g.name.clone()),
        granularity,
        top_by: query
            .top_by
            .unwrap_or_else(|| ReportOptions::default().top_by),
        top_n: query.top_n.unwrap_or(config.analysis.top_n).max(1),
        keywords: config.analysis.keywords,
    };

    let loaded = state.pipeline.load_enriched().await;
    let data = match &group {
        Some(group) => filter_dataset(&loaded.data, group),
        None => loaded.data,
    };
    Ok(Json(build_report(&data, &opts)?))
}

// ============ POST /api/ingest ============

#[derive(Deserialize)]
struct IngestRequest {
    items: Vec<Value>,
    #[serde(default = "default_true")]
    extract_comments: bool,
    #[serde(default)]
    since: Option<NaiveDate>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    dry_run: bool,
}

fn default_true() -> bool {
    true
}

async fn handle_ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestSummary>, AppError> {
    let opts = IngestOptions {
        extract_comments: req.extract_comments,
        since: req.since,
        limit: req.limit,
        dry_run: req.dry_run,
    };
    let summary = ingest_locked(&state, &req.items, &opts)
        .await
        .map_err(|e| internal(format!("{:#}", e)))?;
    Ok(Json(summary))
}

async fn ingest_locked(
    state: &AppState,
    items: &[Value],
    opts: &IngestOptions,
) -> anyhow::Result<IngestSummary> {
    let _guard = state.ingest_lock.lock().await;
    state.pipeline.ingest(items, opts).await
}

// ============ Scrape jobs ============

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
enum JobState {
    Running,
    Succeeded { summary: IngestSummary },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
struct JobStatus {
    id: Uuid,
    request: ScrapeRequest,
    started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    state: JobState,
}

impl JobStatus {
    fn start(request: ScrapeRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            started_at: Utc::now(),
            finished_at: None,
            state: JobState::Running,
        }
    }

    fn finish(&mut self, result: anyhow::Result<IngestSummary>) {
        self.finished_at = Some(Utc::now());
        self.state = match result {
            Ok(summary) => JobState::Succeeded { summary },
            Err(e) => JobState::Failed {
                error: format!("{:#}", e),
            },
        };
    }
}

#[derive(Serialize)]
struct JobAccepted {
    job_id: Uuid,
    status: &'static str,
}

async fn handle_scrape(
    State(state): State<AppState>,
    Json(req): Json<ScrapeRequest>,
) -> Result<(StatusCode, Json<JobAccepted>), AppError> {
    if req.inputs.iter().all(|i| i.trim().is_empty()) {
        return Err(bad_request("inputs must not be empty"));
    }
    let client = collector_client(&state.config)?;

    let job = JobStatus::start(req.clone());
    let job_id = job.id;
    state.jobs.write().await.insert(job_id, job);
    tracing::info!(%job_id, kind = %req.kind, "scrape job queued");

    tokio::spawn(async move {
        let result = run_scrape_job(&state, &client, &req).await;
        if let Err(e) = &result {
            tracing::warn!(%job_id, error = %format!("{:#}", e), "scrape job failed");
        }
        if let Some(job) = state.jobs.write().await.get_mut(&job_id) {
            job.finish(result);
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            job_id,
            status: "running",
        }),
    ))
}

async fn run_scrape_job(
    state: &AppState,
    client: &ApifyClient,
    req: &ScrapeRequest,
) -> anyhow::Result<IngestSummary> {
    let items = client.scrape(req).await?;
    let opts = IngestOptions {
        extract_comments: req.comments_per_video > 0,
        since: req.since,
        ..Default::default()
    };
    ingest_locked(state, &items, &opts).await
}

async fn handle_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobStatus>, AppError> {
    let id = Uuid::parse_str(&id).map_err(|_| bad_request(format!("invalid job id '{}'", id)))?;
    state
        .jobs
        .read()
        .await
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found(format!("job {} not found", id)))
}

// ============ POST /api/webhooks/apify ============

/// Dataset id of a finished run from an Apify webhook payload.
fn webhook_dataset_id(payload: &Value) -> Option<&str> {
    payload
        .pointer("/resource/defaultDatasetId")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

async fn handle_apify_webhook(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<IngestSummary>, AppError> {
    let dataset_id = webhook_dataset_id(&payload)
        .ok_or_else(|| bad_request("payload has no resource.defaultDatasetId"))?
        .to_string();
    let client = collector_client(&state.config)?;
    tracing::info!(%dataset_id, event = ?payload.get("eventType"), "apify webhook");

    let items = client.get_dataset_items(&dataset_id).await.map_err(|e| {
        app_error(StatusCode::BAD_GATEWAY, "upstream_error", e.to_string())
    })?;
    let opts = IngestOptions {
        extract_comments: true,
        ..Default::default()
    };
    let summary = ingest_locked(&state, &items, &opts)
        .await
        .map_err(|e| internal(format!("{:#}", e)))?;
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::ScrapeKind;
    use crate::sentiment::{build_scorer, Lexicon, SentimentStrategy};
    use serde_json::json;

    async fn test_state(groups_path: std::path::PathBuf) -> AppState {
        let mut config = Config::minimal();
        config.groups = vec![KeywordGroup {
            name: "food".into(),
            keywords: vec!["recipe".into()],
            exclude_keywords: vec![],
            exact_match: false,
        }];
        config.cache.groups_path = groups_path;
        let scorer = build_scorer(SentimentStrategy::default(), Arc::new(Lexicon::builtin()));
        AppState {
            groups: Arc::new(RwLock::new(GroupRegistry::from_config(&config).await.unwrap())),
            config: Arc::new(config),
            pipeline: Arc::new(Pipeline::new(Vec::new(), scorer)),
            ingest_lock: Arc::new(Mutex::new(())),
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn names(groups: &[KeywordGroup]) -> Vec<&str> {
        groups.iter().map(|g| g.name.as_str()).collect()
    }

    fn request() -> ScrapeRequest {
        ScrapeRequest {
            kind: ScrapeKind::Hashtag,
            inputs: vec!["food".into()],
            count: None,
            comments_per_video: 0,
            since: None,
        }
    }

    #[test]
    fn test_webhook_dataset_id() {
        let payload = json!({ "eventType": "ACTOR.RUN.SUCCEEDED",
                              "resource": { "id": "r1", "defaultDatasetId": "d1" } });
        assert_eq!(webhook_dataset_id(&payload), Some("d1"));
        assert_eq!(webhook_dataset_id(&json!({ "resource": { "defaultDatasetId": " " } })), None);
        assert_eq!(webhook_dataset_id(&json!({})), None);
    }

    #[test]
    fn test_job_status_serializes_state() {
        let mut job = JobStatus::start(request());
        let running = serde_json::to_value(&job).unwrap();
        assert_eq!(running["state"], "running");
        assert!(running.get("finished_at").is_none());

        job.finish(Err(anyhow::anyhow!("actor run failed")));
        let failed = serde_json::to_value(&job).unwrap();
        assert_eq!(failed["state"], "failed");
        assert_eq!(failed["error"], "actor run failed");
        assert_eq!(failed["request"]["kind"], "hashtag");
    }

    #[test]
    fn test_pipeline_errors_map_to_status() {
        let err: AppError = PipelineError::UnknownField("plays".into()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let err: AppError = PipelineError::Scoring("x".into()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_resolve_group() {
        let groups = vec![KeywordGroup {
            name: "Food".into(),
            keywords: vec!["recipe".into()],
            exclude_keywords: vec![],
            exact_match: false,
        }];
        assert!(resolve_group(&groups, None).unwrap().is_none());
        assert!(resolve_group(&groups, Some("")).unwrap().is_none());
        assert_eq!(resolve_group(&groups, Some("food")).unwrap().unwrap().name, "Food");
        assert_eq!(resolve_group(&groups, Some("tech")).unwrap_err().status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_ingest_request_defaults() {
        let req: IngestRequest = serde_json::from_value(json!({ "items": [] })).unwrap();
        assert!(req.extract_comments);
        assert!(!req.dry_run);
        assert!(req.since.is_none());
    }

    #[tokio::test]
    async fn test_group_upsert_replaces_by_name() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("groups.json");
        let state = test_state(path.clone()).await;

        let group: KeywordGroup =
            serde_json::from_value(json!({ "name": "tech", "keywords": ["ai"] })).unwrap();
        handle_upsert_group(State(state.clone()), Json(group)).await.unwrap();
        let group: KeywordGroup =
            serde_json::from_value(json!({ "name": "food", "keywords": ["pasta"], "exact_match": true }))
                .unwrap();
        let Json(resp) = handle_upsert_group(State(state.clone()), Json(group)).await.unwrap();

        assert_eq!(names(&resp.groups), vec!["tech", "food"]);
        assert!(resp.groups[1].exact_match);
        assert!(path.exists());

        let Json(listed) = handle_groups(State(state.clone())).await;
        assert_eq!(listed.groups, resp.groups);

        let blank: KeywordGroup = serde_json::from_value(json!({ "name": " " })).unwrap();
        let err = handle_upsert_group(State(state), Json(blank)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_group_delete() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("groups.json");
        let state = test_state(path.clone()).await;

        let Json(resp) = handle_delete_group(State(state.clone()), Path("food".into()))
            .await
            .unwrap();
        assert!(resp.groups.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "[]");
        assert!(lookup_group(&state, Some("food")).await.is_err());

        let err = handle_delete_group(State(state), Path("food".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}

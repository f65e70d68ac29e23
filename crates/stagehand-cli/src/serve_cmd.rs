use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use stagehand_core::agent::ConfigError;
use stagehand_core::project::{Project, ProjectError, StageAction, stage_prompt};
use stagehand_core::run::{
    EventBatch, PROMPT_PREVIEW_CHARS, RunError, RunSupervisor, SequencedEvent,
};

/// Agent used when a start request does not name one.
pub const DEFAULT_AGENT: &str = "claude";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        let status = match err {
            ConfigError::UnknownAgent(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<RunError> for AppError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Disabled(msg) => Self::new(StatusCode::FORBIDDEN, msg),
            RunError::Conflict(e) => Self::new(StatusCode::CONFLICT, e.to_string()),
            RunError::Config(e) => e.into(),
        }
    }
}

impl From<ProjectError> for AppError {
    fn from(err: ProjectError) -> Self {
        let status = match err {
            ProjectError::NotFound(_) => StatusCode::NOT_FOUND,
            ProjectError::Forbidden(_) => StatusCode::FORBIDDEN,
            ProjectError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProjectError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

// ---------------------------------------------------------------------------
// State and request types
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<RunSupervisor>,
    pub project: Arc<Project>,
}

impl AppState {
    pub fn new(supervisor: RunSupervisor, project: Project) -> Self {
        Self {
            supervisor: Arc::new(supervisor),
            project: Arc::new(project),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    pub stage_id: Option<String>,
    pub prompt: Option<String>,
    pub agent_id: Option<String>,
    /// Build the prompt from a stage action instead of `prompt`.
    pub action: Option<StageAction>,
    pub target: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    pub run_id: Option<String>,
    pub cursor: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CursorQuery {
    pub cursor: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SkipRequest {
    pub skip: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WriteRequest {
    pub path: Option<String>,
    pub content: Option<String>,
}

/// A present, non-blank string field.
fn required(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.trim().is_empty())
}

/// Escape text for an HTML element body or a quoted attribute.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/agents", get(list_agents))
        .route("/api/agent/run", get(stream_run).post(start_run))
        .route("/api/agent/runs/{id}/events", get(poll_run_events))
        .route("/api/agent/interrupt", post(interrupt_run))
        .route("/api/stages", get(list_stages))
        .route("/api/stages/{id}/skip", post(toggle_skip))
        .route("/api/stages/{id}/files", get(list_stage_files))
        .route("/api/sync", get(sync))
        .route("/api/files/read", get(read_file))
        .route("/api/files/write", post(write_file))
        .route("/api/files/delete", delete(delete_file))
        .route("/api/html/{*path}", get(serve_html))
        .route("/api/static/{*path}", get(serve_static))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(state: AppState, bind: &str, port: u16) -> Result<()> {
    let supervisor = Arc::clone(&state.supervisor);
    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("stagehand serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Do not leave an agent running behind the dashboard.
    if supervisor.is_run_active() {
        if let Err(e) = supervisor.interrupt_run() {
            tracing::warn!(error = %e, "failed to interrupt active run on shutdown");
        }
    }
    tracing::info!("stagehand serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Handlers: dashboard
// ---------------------------------------------------------------------------

async fn index(State(state): State<AppState>) -> Result<Response, AppError> {
    let stages = state.project.list_stages()?;

    let rows = stages
        .iter()
        .map(|s| {
            format!(
                "<tr><td>{id}</td><td>{name}</td><td>{status}</td><td>{files}</td></tr>",
                id = s.stage_id,
                name = s.name,
                status = s.status,
                files = s.files.len(),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let run = match state.supervisor.current_run() {
        Some(run) => format!(
            "<p>Latest run: <code>{id}</code> (stage {stage}, agent {agent}): {status}</p>\
<pre>{prompt}</pre>",
            id = escape_html(run.id()),
            stage = escape_html(run.stage_id()),
            agent = escape_html(run.agent_id()),
            status = run.status(),
            prompt = escape_html(&run.prompt().chars().take(PROMPT_PREVIEW_CHARS).collect::<String>()),
        ),
        None => "<p>No agent run yet.</p>".to_string(),
    };

    let html = format!(
        "<!DOCTYPE html>\
<html><head><title>stagehand</title></head><body>\
<h1>stagehand</h1>\
<p>Project: <code>{root}</code></p>\
{run}\
<p><a href=\"/api/stages\">/api/stages</a> | <a href=\"/api/agents\">/api/agents</a></p>\
<table><tr><th>Stage</th><th>Name</th><th>Status</th><th>Documents</th></tr>{rows}</table>\
</body></html>",
        root = escape_html(&state.project.root().display().to_string()),
    );

    Ok(Html(html).into_response())
}

// ---------------------------------------------------------------------------
// Handlers: agent runs
// ---------------------------------------------------------------------------

async fn list_agents(State(state): State<AppState>) -> Result<Response, AppError> {
    let agents = state.supervisor.list_agents()?;
    Ok(Json(agents).into_response())
}

async fn start_run(
    State(state): State<AppState>,
    body: Result<Json<StartRunRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = body?;
    let stage_id = required(req.stage_id).ok_or_else(|| AppError::bad_request("stageId is required"))?;
    let prompt = match req.action {
        Some(action) => stage_prompt(&stage_id, action, req.target.as_deref())?,
        None => required(req.prompt)
            .ok_or_else(|| AppError::bad_request("prompt or action is required"))?,
    };
    let agent_id = required(req.agent_id).unwrap_or_else(|| DEFAULT_AGENT.to_string());

    let summary = state.supervisor.start_run(&stage_id, &prompt, &agent_id)?;
    Ok(Json(summary).into_response())
}

/// Server-sent events for one run. Each event is named after its category
/// and carries its sequence number as the SSE id, so a reconnecting client
/// resumes after `Last-Event-ID`.
async fn stream_run(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let run_id = required(query.run_id).ok_or_else(|| AppError::bad_request("runId is required"))?;

    let resume_after = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok());
    let cursor = match resume_after {
        Some(seq) => seq.saturating_add(1),
        None => query.cursor.unwrap_or(0),
    };

    tracing::debug!(run_id = %run_id, cursor, "event stream opened");
    let events = sse_events(state.supervisor.stream_events(&run_id, cursor));
    let mut response = Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response();
    response
        .headers_mut()
        .insert("x-accel-buffering", HeaderValue::from_static("no"));
    Ok(response)
}

fn sse_events(
    events: impl Stream<Item = SequencedEvent> + Send + 'static,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    events.map(|item| {
        let data = serde_json::to_string(&item).unwrap_or_default();
        Ok(Event::default()
            .event(item.event.category.as_str())
            .id(item.seq.to_string())
            .data(data))
    })
}

async fn poll_run_events(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<CursorQuery>,
) -> Json<EventBatch> {
    Json(
        state
            .supervisor
            .poll_events(&run_id, query.cursor.unwrap_or(0)),
    )
}

async fn interrupt_run(State(state): State<AppState>) -> Result<Response, AppError> {
    let summary = state.supervisor.interrupt_run()?;
    Ok(Json(summary).into_response())
}

// ---------------------------------------------------------------------------
// Handlers: stages
// ---------------------------------------------------------------------------

async fn list_stages(State(state): State<AppState>) -> Result<Response, AppError> {
    Ok(Json(state.project.list_stages()?).into_response())
}

async fn toggle_skip(
    State(state): State<AppState>,
    Path(stage_id): Path<String>,
    body: Result<Json<SkipRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = body?;
    let skip = req.skip.ok_or_else(|| AppError::bad_request("skip is required"))?;
    let info = state.project.toggle_skip(&stage_id, skip)?;
    Ok(Json(info).into_response())
}

async fn list_stage_files(
    State(state): State<AppState>,
    Path(stage_id): Path<String>,
) -> Result<Response, AppError> {
    Ok(Json(state.project.list_stage_files(&stage_id)?).into_response())
}

async fn sync(State(state): State<AppState>) -> Result<Response, AppError> {
    let stages = state.project.list_stages()?;
    Ok(Json(serde_json::json!({
        "stages": stages,
        "syncedAt": Utc::now(),
    }))
    .into_response())
}

// ---------------------------------------------------------------------------
// Handlers: documents and assets
// ---------------------------------------------------------------------------

async fn read_file(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> Result<Response, AppError> {
    let path = required(query.path).ok_or_else(|| AppError::bad_request("path parameter is required"))?;
    Ok(Json(state.project.read_document(&path)?).into_response())
}

async fn write_file(
    State(state): State<AppState>,
    body: Result<Json<WriteRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = body?;
    let (Some(path), Some(content)) = (required(req.path), req.content) else {
        return Err(AppError::bad_request("path and content are required"));
    };
    Ok(Json(state.project.write_document(&path, &content)?).into_response())
}

async fn delete_file(
    State(state): State<AppState>,
    body: Result<Json<PathQuery>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = body?;
    let path = required(req.path).ok_or_else(|| AppError::bad_request("path is required"))?;
    state.project.delete_document(&path)?;
    Ok(Json(serde_json::json!({ "ok": true })).into_response())
}

/// Serve an HTML document raw so it can be opened in a frame or tab.
async fn serve_html(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    if !path.to_ascii_lowercase().ends_with(".html") {
        return Err(AppError::bad_request("Only HTML files are supported"));
    }
    let doc = state.project.read_document(&path)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        doc.content,
    )
        .into_response())
}

async fn serve_static(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let asset = state.project.read_asset(&path)?;
    Ok((
        [
            (header::CONTENT_TYPE, asset.content_type),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        asset.content,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

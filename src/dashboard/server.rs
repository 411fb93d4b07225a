//! HTTP surface of the dashboard.

use super::{render, Dataset, Filters, Summary, TableRow};
use crate::error::{LitError, Result};
use crate::paper::ClusteredPaper;
use axum::{
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Json, Router,
};
use minijinja::Environment;
use serde::Serialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = std::result::Result<T, ApiError>;

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn internal_error(message: &str) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": message })))
}

fn not_found_error(index: usize) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "paper not found",
            "index": index
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    dataset: Arc<Dataset>,
    templates: Arc<Environment<'static>>,
}

impl AppState {
    /// Fails only if the bundled page template does not parse.
    pub fn new(dataset: Dataset) -> Result<Self> {
        Ok(Self {
            dataset: Arc::new(dataset),
            templates: Arc::new(render::template_env()?),
        })
    }
}

/// Routes of the dashboard
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/health", get(health_handler))
        .route("/api/summary", get(summary_handler))
        .route("/api/papers", get(papers_handler))
        .route("/api/papers/{index}", get(paper_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(host: &str, port: u16, dataset: Dataset) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| LitError::Config(format!("invalid address {}:{}: {}", host, port, e)))?;

    if dataset.is_empty() {
        warn!("Dataset is empty; the dashboard will show no papers");
    }
    let app = build_router(AppState::new(dataset)?);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Dashboard listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn parse_filters(query: Option<String>) -> ApiResult<Filters> {
    Filters::from_query(query.as_deref().unwrap_or("")).map_err(|e| bad_request_error(&e.to_string()))
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn index_page(State(state): State<AppState>, RawQuery(query): RawQuery) -> ApiResult<Html<String>> {
    let query = query.unwrap_or_default();
    let filters = parse_filters(Some(query.clone()))?;
    let selected = url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == "paper")
        .and_then(|(_, v)| v.parse::<usize>().ok());

    let dataset = &state.dataset;
    let summary = dataset.summarize(&filters);
    let rows = dataset.table(&filters);
    let detail = selected.and_then(|i| dataset.paper(i));
    render::page(&state.templates, dataset, &filters, &summary, &rows, detail)
        .map(Html)
        .map_err(|e| internal_error(&e.to_string()))
}

async fn summary_handler(State(state): State<AppState>, RawQuery(query): RawQuery) -> ApiResult<Json<Summary>> {
    let filters = parse_filters(query)?;
    Ok(Json(state.dataset.summarize(&filters)))
}

async fn papers_handler(State(state): State<AppState>, RawQuery(query): RawQuery) -> ApiResult<Json<Vec<TableRow>>> {
    let filters = parse_filters(query)?;
    Ok(Json(state.dataset.table(&filters)))
}

/// Full record of one paper, abstract included
#[derive(Debug, Serialize)]
pub struct PaperDetail<'a> {
    pub index: usize,
    #[serde(flatten)]
    pub paper: &'a ClusteredPaper,
    /// Leading terms of the paper's LDA topic
    pub topic_terms: Option<String>,
}

async fn paper_handler(State(state): State<AppState>, Path(index): Path<usize>) -> ApiResult<Json<Value>> {
    let paper = state.dataset.paper(index).ok_or_else(|| not_found_error(index))?;
    let topic_terms = paper
        .lda_topic
        .and_then(|t| state.dataset.topics().and_then(|s| s.topic_label(t)));

    let detail = PaperDetail {
        index,
        paper,
        topic_terms,
    };
    serde_json::to_value(&detail)
        .map(Json)
        .map_err(|e| internal_error(&e.to_string()))
}

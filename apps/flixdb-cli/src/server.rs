//! HTTP surface over the movie engine, the help center and the semantic cache.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use flixdb_core::types::SearchMode;
use flixdb_core::{Error, ErrorBody};
use flixdb_rag::{CacheStats, ChatRequest, ChatResponse, HelpStats};
use flixdb_retrieval::{IngestReport, SearchRequest, SearchResponse};

use crate::bootstrap::AppContext;

type AppState = Arc<AppContext>;

/// Error wrapper that renders as `{kind, stage?, message}` with a status code.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::InvalidQuery(_) | Error::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::EmbeddingFailure(_) | Error::GenerationFailure(_) => StatusCode::BAD_GATEWAY,
        Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        Error::IndexUnavailable { .. } | Error::CacheUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::warn!(kind = self.0.kind(), error = %self.0, "request failed");
        }
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct IndexHealth {
    pub name: String,
    pub num_docs: usize,
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub movies: IndexHealth,
    pub help: HelpStats,
    pub cache: CacheStats,
}

#[derive(Debug, Deserialize)]
pub struct CacheQuery {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheQueryResponse {
    pub hit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct CacheStoreRequest {
    pub prompt: String,
    pub response: String,
}

pub fn router(ctx: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/search/:mode", post(search))
        .route("/api/help/chat", post(help_chat))
        .route("/api/help/stats", get(help_stats))
        .route("/api/help/suggestions", get(help_suggestions))
        .route("/api/help/ingest", post(help_ingest))
        .route("/api/cache/stats", get(cache_stats))
        .route("/api/cache/clear", post(cache_clear))
        .route("/api/cache/query", post(cache_query))
        .route("/api/cache/store", post(cache_store))
        .route("/api/admin/clear-data", post(admin_clear_data))
        .route("/api/admin/create-index", post(admin_create_index))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Binds `server.host:server.port` and serves until Ctrl-C.
pub async fn serve(ctx: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", ctx.settings.server.host, ctx.settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

async fn health(State(ctx): State<AppState>) -> Json<HealthReport> {
    let movies = match ctx.movies.index().info().await {
        Ok(info) => IndexHealth { name: info.name, num_docs: info.num_docs, exists: info.exists, error: None },
        Err(e) => IndexHealth {
            name: ctx.movies.index().schema().name.clone(),
            num_docs: 0,
            exists: false,
            error: Some(e.to_string()),
        },
    };
    let help = ctx.help.stats().await;
    let cache = ctx.help.cache().stats().await;

    let status = if movies.error.is_some() {
        "unhealthy"
    } else if !movies.exists || help.index_status != "active" || cache.status != "active" {
        "degraded"
    } else {
        "healthy"
    };
    Json(HealthReport { status: status.to_string(), movies, help, cache })
}

async fn search(
    State(ctx): State<AppState>,
    Path(mode): Path<String>,
    Json(req): Json<SearchRequest>,
) -> ApiResult<SearchResponse> {
    let mode = SearchMode::parse(&mode).ok_or_else(|| Error::invalid_query(format!("unknown search mode: {mode}")))?;
    let options = req.options(mode, ctx.movies.settings());
    let results = ctx.movies.search(&req.query, mode, &options).await?;
    Ok(Json(SearchResponse::new(results, mode)))
}

async fn help_chat(State(ctx): State<AppState>, Json(req): Json<ChatRequest>) -> ApiResult<ChatResponse> {
    Ok(Json(ctx.help.chat(&req).await?))
}

async fn help_stats(State(ctx): State<AppState>) -> Json<HelpStats> {
    Json(ctx.help.stats().await)
}

async fn help_suggestions(State(ctx): State<AppState>) -> Json<Value> {
    Json(json!({ "suggestions": ctx.help.suggestions() }))
}

async fn help_ingest(State(ctx): State<AppState>) -> ApiResult<IngestReport> {
    Ok(Json(ctx.ingest_articles(&ProgressBar::hidden()).await?))
}

async fn cache_stats(State(ctx): State<AppState>) -> Json<CacheStats> {
    Json(ctx.help.cache().stats().await)
}

async fn cache_clear(State(ctx): State<AppState>) -> ApiResult<Value> {
    let cleared = ctx.help.cache().clear().await?;
    Ok(Json(json!({ "cleared": cleared })))
}

async fn cache_query(State(ctx): State<AppState>, Json(req): Json<CacheQuery>) -> ApiResult<CacheQueryResponse> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err(Error::invalid_query("query must not be empty").into());
    }
    let response = match ctx.help.cache().lookup(query).await? {
        Some(hit) => CacheQueryResponse {
            hit: true,
            prompt: Some(hit.entry.prompt),
            response: Some(hit.entry.response),
            similarity: Some(hit.similarity),
            distance: Some(hit.distance),
        },
        None => CacheQueryResponse { hit: false, prompt: None, response: None, similarity: None, distance: None },
    };
    Ok(Json(response))
}

async fn cache_store(State(ctx): State<AppState>, Json(req): Json<CacheStoreRequest>) -> ApiResult<Value> {
    let prompt = req.prompt.trim();
    if prompt.is_empty() || req.response.trim().is_empty() {
        return Err(Error::invalid_query("prompt and response must not be empty").into());
    }
    let pii = ctx.help.guardrails().pii();
    let mut kinds = pii.kinds(prompt);
    kinds.extend(pii.kinds(&req.response));
    if !kinds.is_empty() {
        kinds.sort();
        kinds.dedup();
        let names: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
        return Err(Error::invalid_query(format!("refusing to cache text containing PII: {}", names.join(", "))).into());
    }
    let entry = ctx.help.cache().store(prompt, &req.response).await?;
    Ok(Json(json!({ "stored": true, "id": entry.id })))
}

async fn admin_clear_data(State(ctx): State<AppState>) -> ApiResult<Value> {
    ctx.movies.index().clear().await?;
    tracing::info!(index = %ctx.movies.index().schema().name, "cleared movie index");
    Ok(Json(json!({ "cleared": true })))
}

async fn admin_create_index(State(ctx): State<AppState>) -> ApiResult<IngestReport> {
    Ok(Json(ctx.reindex_movies(&ProgressBar::hidden()).await?))
}

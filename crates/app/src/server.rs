//! HTTP wrapper around the builder and retriever.
//!
//! | Method | Path | Body |
//! |--------|------|------|
//! | `POST` | `/rebuild` | none; returns the build report and reloads the index |
//! | `GET`  | `/status` | none |
//! | `POST` | `/retrieve` | `{"query", "top_k"?, "active_pdf"?}` |
//! | `GET`  | `/health` | none |
//!
//! Errors come back as `{"detail": "<message>"}`.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pdf_retriever_core::{
    build_index, BuildReport, Embedder, IndexStatus, IndexerOptions, PdfExtractor,
    RetrieveQuery, RetrievedChunk, Retriever, DEFAULT_TOP_K,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    options: Arc<IndexerOptions>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn PdfExtractor>,
    retriever: Arc<Retriever>,
    rebuild_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(
        options: IndexerOptions,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn PdfExtractor>,
        retriever: Arc<Retriever>,
    ) -> Self {
        Self {
            options: Arc::new(options),
            embedder,
            extractor,
            retriever,
            rebuild_lock: Arc::new(Mutex::new(())),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/rebuild", post(handle_rebuild))
        .route("/status", get(handle_status))
        .route("/retrieve", post(handle_retrieve))
        .route("/health", get(handle_health))
        .with_state(state)
}

pub async fn run_server(bind: &str, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "indexer service listening");
    axum::serve(listener, app).await?;
    Ok(())
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "detail": self.message })),
        )
            .into_response()
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.into(),
    }
}

async fn handle_rebuild(State(state): State<AppState>) -> Result<Json<BuildReport>, AppError> {
    let _guard = state.rebuild_lock.lock().await;
    let worker = state.clone();

    let report = tokio::task::spawn_blocking(move || -> anyhow::Result<BuildReport> {
        let handle = worker.retriever.handle();
        let report = build_index(
            handle.paths(),
            &worker.options,
            worker.extractor.as_ref(),
            worker.embedder.as_ref(),
        )?;
        handle.reload()?;
        Ok(report)
    })
    .await
    .map_err(|error| internal(error.to_string()))?
    .map_err(|error| {
        warn!(%error, "rebuild failed");
        internal(error.to_string())
    })?;

    Ok(Json(report))
}

async fn handle_status(State(state): State<AppState>) -> Json<IndexStatus> {
    Json(state.retriever.status())
}

fn default_top_k() -> i64 {
    DEFAULT_TOP_K as i64
}

#[derive(Debug, Deserialize)]
struct RetrieveRequest {
    query: String,
    #[serde(default = "default_top_k")]
    top_k: i64,
    #[serde(default, alias = "active_pdf")]
    active_document: Option<String>,
}

impl From<RetrieveRequest> for RetrieveQuery {
    fn from(request: RetrieveRequest) -> Self {
        Self {
            query: request.query,
            top_k: usize::try_from(request.top_k).unwrap_or(0),
            active_document: request.active_document,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RetrieveResponse {
    results: Vec<RetrievedChunk>,
}

async fn handle_retrieve(
    State(state): State<AppState>,
    Json(request): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>, AppError> {
    let query = RetrieveQuery::from(request);
    info!(
        query = %query.query,
        top_k = query.top_k,
        active_document = ?query.active_document,
        "retrieve"
    );

    let retriever = state.retriever.clone();
    let results = tokio::task::spawn_blocking(move || retriever.retrieve(&query))
        .await
        .map_err(|error| internal(error.to_string()))?
        .map_err(|error| internal(error.to_string()))?;

    Ok(Json(RetrieveResponse { results }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

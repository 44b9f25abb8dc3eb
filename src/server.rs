//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/api/documents` | Ingest `{filename, content: [items]}` |
//! | `GET`    | `/api/documents` | List documents (`?limit=&offset=`) |
//! | `DELETE` | `/api/documents/{id}` | Delete a document and its chunks |
//! | `POST`   | `/api/search` | Hybrid retrieval for `{query, top_k?}` |
//! | `POST`   | `/api/chat` | Ask `{message, session_id?}` |
//! | `GET`    | `/api/chat/{session_id}` | Recent history of a session |
//! | `DELETE` | `/api/chat/{session_id}` | Clear a session's history |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! can be served from anywhere.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use hybrid_rag_core::models::{Document, RetrievalResult, RetrievalSource};

use crate::cache::ChatMessage;
use crate::chat::ChatReply;
use crate::config::Config;
use crate::services::Services;

const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_TOP_K: usize = 100;

type AppState = Arc<Services>;

/// Start the HTTP server on `[server].bind` and serve until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let services = Arc::new(Services::open(config).await?);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("Hybrid RAG server listening on http://{}", bind_addr);
    info!(bind = %bind_addr, "server started");

    axum::serve(listener, router(services)).await?;
    Ok(())
}

/// Build the API router over shared services.
pub fn router(services: Arc<Services>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/api/documents",
            post(handle_upload_document).get(handle_list_documents),
        )
        .route("/api/documents/{id}", delete(handle_delete_document))
        .route("/api/search", post(handle_search))
        .route("/api/chat", post(handle_chat))
        .route(
            "/api/chat/{session_id}",
            get(handle_chat_history).delete(handle_clear_chat),
        )
        .layer(cors)
        .with_state(services)
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
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        error!(error = %err, "request failed");
        internal(format!("{:#}", err))
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Documents ============

#[derive(Deserialize)]
pub struct UploadRequest {
    pub filename: String,
    pub content: Vec<Value>,
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: String,
    pub filename: String,
    pub chunk_count: usize,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl DocumentResponse {
    fn new(doc: Document, chunk_count: usize) -> Self {
        Self {
            id: doc.id,
            filename: doc.filename,
            chunk_count,
            metadata: doc.metadata,
            created_at: doc.created_at,
        }
    }
}

async fn handle_upload_document(
    State(services): State<AppState>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<DocumentResponse>, AppError> {
    if req.filename.trim().is_empty() {
        return Err(bad_request("filename must not be empty"));
    }
    let outcome = services.ingest_items(&req.filename, &req.content).await?;
    Ok(Json(DocumentResponse::new(
        outcome.document,
        outcome.chunk_count,
    )))
}

#[derive(Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Serialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentResponse>,
    pub total: usize,
}

async fn handle_list_documents(
    State(services): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let documents: Vec<DocumentResponse> = services
        .list_documents(limit, params.offset.unwrap_or(0))
        .await?
        .into_iter()
        .map(|(doc, chunk_count)| DocumentResponse::new(doc, chunk_count))
        .collect();
    let total = documents.len();
    Ok(Json(DocumentListResponse { documents, total }))
}

#[derive(Serialize)]
struct DeletedResponse {
    id: String,
    deleted: bool,
}

async fn handle_delete_document(
    State(services): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, AppError> {
    if !services.delete_document(&id).await? {
        return Err(not_found(format!("document not found: {}", id)));
    }
    Ok(Json(DeletedResponse { id, deleted: true }))
}

// ============ POST /api/search ============

#[derive(Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: Option<usize>,
}

#[derive(Serialize)]
pub struct SearchResultItem {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub score: f64,
    pub source: RetrievalSource,
}

impl From<&RetrievalResult> for SearchResultItem {
    fn from(r: &RetrievalResult) -> Self {
        Self {
            id: r.chunk.id.clone(),
            document_id: r.chunk.document_id.clone(),
            chunk_index: r.chunk.chunk_index,
            content: r.chunk.content.clone(),
            score: r.score,
            source: r.source,
        }
    }
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
}

async fn handle_search(
    State(services): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let top_k = req.top_k.unwrap_or(services.config.retrieval.top_k);
    if top_k == 0 || top_k > MAX_TOP_K {
        return Err(bad_request(format!(
            "top_k must be between 1 and {}",
            MAX_TOP_K
        )));
    }

    let results = services.pipeline.retrieve(&req.query, top_k).await?;
    Ok(Json(SearchResponse {
        results: results.iter().map(SearchResultItem::from).collect(),
    }))
}

// ============ Chat ============

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<String>,
}

async fn handle_chat(
    State(services): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatReply>, AppError> {
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let reply = services.chat.ask(&req.message, req.session_id).await?;
    Ok(Json(reply))
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
}

async fn handle_chat_history(
    State(services): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let messages = services.chat.history(&session_id).await?;
    Ok(Json(HistoryResponse {
        session_id,
        messages,
    }))
}

#[derive(Serialize)]
struct ClearedResponse {
    session_id: String,
    cleared: bool,
}

async fn handle_clear_chat(
    State(services): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ClearedResponse>, AppError> {
    let cleared = services.chat.clear_history(&session_id).await?;
    Ok(Json(ClearedResponse {
        session_id,
        cleared,
    }))
}

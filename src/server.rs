//! HTTP API.
//!
//! Every request names its session explicitly. An upload creates the session
//! (or replaces it, resetting the history), queries run against it, and a
//! delete drops it. Nothing survives a restart.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Service banner with links |
//! | `GET`  | `/health` | Health check (version, whether an API key is set) |
//! | `POST` | `/upload` | Multipart `files` + `session_id`; builds the session index |
//! | `POST` | `/query` | `{question, session_id, chat_history?}` → answer |
//! | `DELETE` | `/session/{id}` | Drop a session |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "Session not found: abc" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `payload_too_large`
//! (413), `internal` (500), `upstream_error` (502), `overloaded` (503).
//!
//! # Backpressure
//!
//! Upload and query work is bounded by `[server].max_concurrent_requests`.
//! A request that cannot get a slot within `[server].queue_timeout_secs`
//! fails with `503 overloaded`.

use anyhow::Context;
use axum::{
    extract::{
        multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, Path,
        State,
    },
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::assistant::Assistant;
use crate::config::Config;
use crate::error::QaError;
use crate::llm::ensure_api_key;
use crate::models::{ChatHistory, ChatTurn, PdfDocument, SourceChunk};
use crate::session::{InMemorySessionStore, Session, SessionStore};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    assistant: Arc<Assistant>,
    sessions: Arc<dyn SessionStore>,
    permits: Arc<Semaphore>,
}

impl AppState {
    pub fn new(config: Config, assistant: Assistant, sessions: Arc<dyn SessionStore>) -> Self {
        let permits = Arc::new(Semaphore::new(config.server.max_concurrent_requests.max(1)));
        Self {
            config: Arc::new(config),
            assistant: Arc::new(assistant),
            sessions,
            permits,
        }
    }

    /// Waits for a work slot, giving up after the configured queue timeout.
    async fn acquire_slot(&self) -> Result<OwnedSemaphorePermit, AppError> {
        let wait = Duration::from_secs(self.config.server.queue_timeout_secs);
        match tokio::time::timeout(wait, self.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(internal("request queue closed")),
            Err(_) => {
                warn!(waited_secs = wait.as_secs(), "no free request slot, rejecting");
                Err(overloaded("Server is busy, try again later"))
            }
        }
    }
}

/// Starts the HTTP server on `[server].bind` and runs until Ctrl-C.
///
/// Without an LLM API key the server still starts (queries then fail with a
/// configuration error) unless `require_api_key` or
/// `[llm].require_api_key` asks for a hard failure.
pub async fn run_server(config: &Config, require_api_key: bool) -> anyhow::Result<()> {
    if require_api_key || config.llm.require_api_key {
        ensure_api_key(&config.llm)?;
    } else if config.llm.api_key().is_none() {
        warn!(
            variable = config.llm.api_key_var(),
            "LLM API key not set; queries will fail until it is configured"
        );
    }

    let assistant = Assistant::from_config(config)?;
    let state = AppState::new(
        config.clone(),
        assistant,
        Arc::new(InMemorySessionStore::new()),
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(
        addr = %listener.local_addr()?,
        llm = state.assistant.llm().model_name(),
        embedding = state.assistant.embedder().model_name(),
        "PDF Q&A server listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}

/// Builds the application router with CORS, tracing and body-size layers.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);
    let max_upload = state.config.server.max_upload_bytes;

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/upload", post(handle_upload))
        .route("/query", post(handle_query))
        .route("/session/{id}", delete(handle_delete_session))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
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

fn app_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code,
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    app_error(StatusCode::NOT_FOUND, "not_found", message)
}

fn payload_too_large(message: impl Into<String>) -> AppError {
    app_error(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", message)
}

fn upstream_error(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_GATEWAY, "upstream_error", message)
}

fn overloaded(message: impl Into<String>) -> AppError {
    app_error(StatusCode::SERVICE_UNAVAILABLE, "overloaded", message)
}

fn internal(message: impl Into<String>) -> AppError {
    app_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

impl From<QaError> for AppError {
    fn from(err: QaError) -> Self {
        match &err {
            QaError::Validation(_) | QaError::EmptyInput => bad_request(err.to_string()),
            QaError::SessionNotFound(id) => not_found(format!("Session not found: {}", id)),
            QaError::Embedding(_) | QaError::Llm(_) => {
                warn!(error = %err, "upstream service failed");
                upstream_error(err.to_string())
            }
            QaError::Extraction(_) | QaError::Config(_) | QaError::Internal(_) => {
                error!(error = %err, "request failed");
                internal(err.to_string())
            }
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            payload_too_large(err.body_text())
        } else {
            bad_request(format!("Invalid multipart body: {}", err.body_text()))
        }
    }
}

// ============ GET / ============

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
    docs: Vec<&'static str>,
    health: &'static str,
}

async fn handle_root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "PDF Q&A API",
        docs: vec!["POST /upload", "POST /query", "DELETE /session/{id}"],
        health: "/health",
    })
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: &'static str,
    version: &'static str,
    api_key_configured: bool,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        api_key_configured: state.config.llm.api_key().is_some(),
    })
}

// ============ POST /upload ============

#[derive(Serialize)]
struct SkippedFile {
    name: String,
    reason: String,
}

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    session_id: String,
    chunks_count: usize,
    /// Files that contributed no text.
    skipped: Vec<SkippedFile>,
}

/// Handler for `POST /upload`.
///
/// Reads every `files` part and the `session_id` field, builds a fresh
/// index and stores it under that id, replacing any previous session.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut documents = Vec::new();
    let mut session_id: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("files") => {
                let name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                // Browsers send an empty part when no file was picked.
                if name.is_empty() && bytes.is_empty() {
                    continue;
                }
                documents.push(PdfDocument::new(name, bytes.to_vec()));
            }
            Some("session_id") => {
                session_id = Some(field.text().await?.trim().to_string());
            }
            _ => {}
        }
    }

    crate::assistant::validate_uploads(&documents)?;
    let session_id = session_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| bad_request("session_id is required"))?;

    let file_count = documents.len();
    let _slot = state.acquire_slot().await?;
    let upload = state.assistant.build_index(documents).await?;
    let chunks_count = upload.index.len();

    let replaced = state
        .sessions
        .put(Session::new(session_id.clone(), upload.index))
        .await;
    info!(
        session_id = %session_id,
        files = file_count,
        chunks = chunks_count,
        replaced,
        "upload indexed"
    );

    Ok(Json(UploadResponse {
        message: format!("Successfully processed {} PDF file(s)", file_count),
        session_id,
        chunks_count,
        skipped: upload
            .report
            .skipped
            .into_iter()
            .map(|s| SkippedFile {
                name: s.name,
                reason: s.reason,
            })
            .collect(),
    }))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
    session_id: String,
    /// Seeds an empty session history; ignored once the server has turns.
    #[serde(default)]
    chat_history: Vec<ChatTurn>,
}

#[derive(Serialize)]
struct QueryResponse {
    answer: String,
    session_id: String,
    sources: Vec<SourceChunk>,
}

/// Handler for `POST /query`.
///
/// Holds the session lock from retrieval until the exchange is recorded, so
/// concurrent queries to one session are answered in turn.
async fn handle_query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;

    if request.question.trim().is_empty() {
        return Err(bad_request("Question cannot be empty"));
    }

    let shared = state.sessions.get(&request.session_id).await?;
    // Queued behind its own session, a query holds no work slot.
    let mut session = shared.lock().await;
    let _slot = state.acquire_slot().await?;

    let seeded = session.history.is_empty() && !request.chat_history.is_empty();
    if seeded {
        for turn in request.chat_history {
            session.history.push(turn);
        }
    }

    let answer = match state.assistant.ask(&mut session, &request.question).await {
        Ok(answer) => answer,
        Err(e) => {
            if seeded {
                session.history = ChatHistory::new();
            }
            return Err(e.into());
        }
    };

    Ok(Json(QueryResponse {
        answer: answer.answer,
        session_id: request.session_id,
        sources: answer.sources,
    }))
}

// ============ DELETE /session/{id} ============

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.sessions.remove(&id).await?;
    info!(session_id = %id, "session deleted");
    Ok(Json(MessageResponse {
        message: format!("Session {} deleted", id),
    }))
}

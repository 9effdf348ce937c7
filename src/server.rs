//! HTTP server for multi-user document chat.
//!
//! Each client creates a session, uploads documents into it, and asks
//! questions. Sessions are independent and live in memory until deleted,
//! until they sit unused for `[server].session_idle_secs`, or until the
//! process exits. At most `[server].max_sessions` exist at once.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/sessions` | Create a session, returns `{ "id" }` |
//! | `POST` | `/sessions/{id}/documents` | Upload documents (base64), rebuilds the index |
//! | `POST` | `/sessions/{id}/ask` | Ask a question |
//! | `GET`  | `/sessions/{id}/history` | Conversation so far |
//! | `POST` | `/sessions/{id}/reset` | Clear the conversation |
//! | `DELETE` | `/sessions/{id}` | Drop the session |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "no_index", "message": "no documents have been indexed yet; upload documents first" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `no_index` (409),
//! `extraction_failed` (422), `embedding_failed` (502), `generation_failed` (502),
//! `too_many_sessions` (503).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

use docqa_core::embedding::EmbeddingProvider;
use docqa_core::generation::GenerationProvider;
use docqa_core::models::Message;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::extract::{Document, DocumentFormat};
use crate::generation::create_generator;
use crate::progress::NoProgress;
use crate::session::{Session, SessionConfig, SharedSession, UploadSummary};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

struct SessionEntry {
    session: SharedSession,
    last_used: Instant,
}

impl AppState {
    /// Providers are shared by every session; each session gets its own
    /// index and history.
    pub fn new(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            embedder,
            generator,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Look up a session and mark it as used.
    async fn session(&self, id: &str) -> Result<SharedSession, AppError> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(id)
            .ok_or_else(|| not_found(format!("no session with id: {}", id)))?;
        entry.last_used = Instant::now();
        Ok(entry.session.clone())
    }
}

/// Build the router. Exposed so tests can drive it without a socket.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = state.config.server.max_upload_bytes;

    Router::new()
        .route("/health", get(handle_health))
        .route("/sessions", post(handle_create_session))
        .route("/sessions/{id}", axum::routing::delete(handle_delete_session))
        .route("/sessions/{id}/documents", post(handle_upload))
        .route("/sessions/{id}/ask", post(handle_ask))
        .route("/sessions/{id}/history", get(handle_history))
        .route("/sessions/{id}/reset", post(handle_reset))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);
    let generator: Arc<dyn GenerationProvider> =
        Arc::from(create_generator(&config.generation)?);
    let bind_addr = config.server.bind.clone();
    let app = router(AppState::new(config.clone(), embedder, generator));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "docqa server listening");
    println!("docqa server listening on http://{}", bind_addr);
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

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
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

impl From<docqa_core::Error> for AppError {
    fn from(err: docqa_core::Error) -> Self {
        use docqa_core::Error;
        let status = match &err {
            Error::Extraction { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Configuration(_) => StatusCode::BAD_REQUEST,
            Error::Embedding(_) | Error::Generation(_) => StatusCode::BAD_GATEWAY,
            Error::NoIndex => StatusCode::CONFLICT,
        };
        if status.is_server_error() {
            tracing::warn!(error = %err, "provider failure");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
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

// ============ Sessions ============

#[derive(Serialize)]
struct CreatedSession {
    id: String,
}

async fn handle_create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<CreatedSession>), AppError> {
    let limits = &state.config.server;
    let idle = Duration::from_secs(limits.session_idle_secs);
    let mut sessions = state.sessions.write().await;

    let before = sessions.len();
    sessions.retain(|_, entry| entry.last_used.elapsed() < idle);
    if sessions.len() < before {
        tracing::info!(evicted = before - sessions.len(), "dropped idle sessions");
    }
    if sessions.len() >= limits.max_sessions {
        return Err(AppError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "too_many_sessions".to_string(),
            message: format!(
                "session limit of {} reached; delete a session or retry later",
                limits.max_sessions
            ),
        });
    }

    let id = uuid::Uuid::new_v4().to_string();
    let session = Session::new(
        SessionConfig::from(state.config.as_ref()),
        state.embedder.clone(),
        state.generator.clone(),
    );
    sessions.insert(
        id.clone(),
        SessionEntry {
            session: session.shared(),
            last_used: Instant::now(),
        },
    );
    tracing::debug!(session = %id, "session created");
    Ok((StatusCode::CREATED, Json(CreatedSession { id })))
}

async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state
        .sessions
        .write()
        .await
        .remove(&id)
        .ok_or_else(|| not_found(format!("no session with id: {}", id)))?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ POST /sessions/{id}/documents ============

#[derive(Deserialize)]
struct UploadRequest {
    documents: Vec<UploadedDocument>,
}

#[derive(Deserialize)]
struct UploadedDocument {
    name: String,
    /// `text`, `pdf`, or `docx`. Inferred from `name` when absent.
    #[serde(default)]
    format: Option<String>,
    content_base64: String,
}

impl UploadedDocument {
    fn decode(self) -> Result<Document, AppError> {
        let format = match &self.format {
            Some(f) => f.parse::<DocumentFormat>().map_err(bad_request)?,
            None => DocumentFormat::from_path(std::path::Path::new(&self.name)).ok_or_else(
                || {
                    bad_request(format!(
                        "cannot infer format of '{}'; set \"format\" to text, pdf, or docx",
                        self.name
                    ))
                },
            )?,
        };
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(self.content_base64.trim())
            .map_err(|e| bad_request(format!("'{}': invalid base64: {}", self.name, e)))?;
        Ok(Document::new(self.name, format, bytes))
    }
}

async fn handle_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<UploadSummary>, AppError> {
    let session = state.session(&id).await?;
    let docs = request
        .documents
        .into_iter()
        .map(UploadedDocument::decode)
        .collect::<Result<Vec<_>, _>>()?;

    let summary = session
        .lock()
        .await
        .upload_documents(docs, &NoProgress)
        .await?;
    Ok(Json(summary))
}

// ============ POST /sessions/{id}/ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Serialize)]
struct SourceView {
    index: usize,
    distance: f32,
    text: String,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    sources: Vec<SourceView>,
    history: Vec<Message>,
}

async fn handle_ask(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let session = state.session(&id).await?;
    let answer = session.lock().await.ask(&request.question).await?;

    Ok(Json(AskResponse {
        answer: answer.text,
        sources: answer
            .sources
            .into_iter()
            .map(|s| SourceView {
                index: s.chunk.index,
                distance: s.distance,
                text: s.chunk.text,
            })
            .collect(),
        history: answer.history.messages(),
    }))
}

// ============ History ============

#[derive(Serialize)]
struct HistoryResponse {
    history: Vec<Message>,
}

async fn handle_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let session = state.session(&id).await?;
    let history = session.lock().await.history().messages();
    Ok(Json(HistoryResponse { history }))
}

async fn handle_reset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let session = state.session(&id).await?;
    session.lock().await.reset();
    Ok(StatusCode::NO_CONTENT)
}

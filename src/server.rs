//! HTTP API for ingestion-backed channel Q&A.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/channels` | List Slack channels visible to the bot |
//! | `POST` | `/qa` | Ask a question, optionally refreshing the index first |
//! | `GET`  | `/channels/{channel}/stats` | Persisted ingestion cursor for a channel |
//!
//! # Error Contract
//!
//! All error responses carry a machine-readable code and a message:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "top_k must be between 1 and 20" } }
//! ```
//!
//! Ingestion failures (unknown channel, upstream API errors) map to 400;
//! unexpected QA failures map to 500.
//!
//! Refresh-before-answer holds a per-channel async lock, so two concurrent
//! `/qa` calls refreshing the same channel run their ingestion passes one
//! after the other instead of racing on the cursor file.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::cursor::CursorStore;
use crate::ingest::run_ingest;
use crate::qa::answer_question;
use crate::slack::SlackClient;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    /// One lock per channel, created lazily, serializing ingestion runs.
    ingest_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl AppState {
    async fn channel_lock(&self, channel: &str) -> Arc<Mutex<()>> {
        let mut locks = self.ingest_locks.lock().await;
        locks
            .entry(channel.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Start the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState {
        config: Arc::new(config.clone()),
        ingest_locks: Arc::new(Mutex::new(HashMap::new())),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/channels", get(handle_list_channels))
        .route("/qa", post(handle_qa))
        .route("/channels/{channel}/stats", get(handle_channel_stats))
        .layer(cors)
        .with_state(state);

    println!("Q&A server listening on http://{}", bind_addr);

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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ Handlers ============

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

#[derive(Deserialize)]
struct ListChannelsParams {
    #[serde(default = "default_include_private")]
    include_private: bool,
}

fn default_include_private() -> bool {
    true
}

#[derive(Serialize)]
struct ChannelsResponse {
    channels: Vec<String>,
}

async fn handle_list_channels(
    State(state): State<AppState>,
    Query(params): Query<ListChannelsParams>,
) -> Result<Json<ChannelsResponse>, AppError> {
    let client = SlackClient::new(&state.config.slack).map_err(|e| bad_request(e.to_string()))?;
    let channels = client
        .list_channels(params.include_private)
        .await
        .map_err(|e| bad_request(e.to_string()))?;
    Ok(Json(ChannelsResponse {
        channels: channels.into_iter().map(|c| c.name).collect(),
    }))
}

#[derive(Deserialize)]
struct QaRequest {
    channel: String,
    query: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default)]
    refresh: bool,
    #[serde(default)]
    force_full_refresh: bool,
}

fn default_top_k() -> usize {
    5
}

#[derive(Serialize)]
struct SourceDoc {
    text: String,
    metadata: crate::models::DocumentMetadata,
}

#[derive(Serialize)]
struct QaResponse {
    answer: String,
    sources: Vec<SourceDoc>,
}

async fn handle_qa(
    State(state): State<AppState>,
    Json(request): Json<QaRequest>,
) -> Result<Json<QaResponse>, AppError> {
    if request.channel.is_empty() {
        return Err(bad_request("channel must not be empty"));
    }
    if request.query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if !(1..=20).contains(&request.top_k) {
        return Err(bad_request("top_k must be between 1 and 20"));
    }

    if request.refresh {
        let lock = state.channel_lock(&request.channel).await;
        let _guard = lock.lock().await;
        let outcome = run_ingest(&state.config, &request.channel, request.force_full_refresh)
            .await
            .map_err(|e| {
                error!(channel = %request.channel, error = %e, "refresh failed");
                bad_request(format!("{e:#}"))
            })?;
        info!(
            channel = %request.channel,
            mode = %outcome.mode,
            committed = outcome.committed,
            "refreshed before answering"
        );
    }

    let result = answer_question(
        &state.config,
        &request.channel,
        &request.query,
        request.top_k,
    )
    .await
    .map_err(|e| {
        let message = format!("{e:#}");
        if message.contains("not ingested") || message.contains("dimension mismatch") {
            bad_request(message)
        } else {
            error!(channel = %request.channel, error = %message, "qa failed");
            internal_error(message)
        }
    })?;

    Ok(Json(QaResponse {
        answer: result.answer,
        sources: result
            .sources
            .into_iter()
            .map(|d| SourceDoc {
                text: d.content,
                metadata: d.metadata,
            })
            .collect(),
    }))
}

#[derive(Serialize)]
struct ChannelStatsResponse {
    channel: String,
    last_timestamp: Option<String>,
    total_messages: u64,
    last_updated: Option<String>,
}

async fn handle_channel_stats(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Json<ChannelStatsResponse> {
    let cursors = CursorStore::load(&state.config.cursor.path);
    let response = match cursors.get(&channel) {
        Some(cursor) => ChannelStatsResponse {
            channel,
            last_timestamp: Some(cursor.last_timestamp.clone()),
            total_messages: cursor.total_messages,
            last_updated: Some(cursor.last_updated.clone()),
        },
        None => ChannelStatsResponse {
            channel,
            last_timestamp: None,
            total_messages: 0,
            last_updated: None,
        },
    };
    Json(response)
}

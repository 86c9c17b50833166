//! HTTP surface for the conversation core. Thin by design: JSON in, JSON
//! out, and the error taxonomy mapped to statuses — validation 400,
//! not-found 404, integration 502, anything unexpected 500. Downstream and
//! internal details never reach the body, only the logs.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use leadline_agent::Orchestrator;
use leadline_core::domain::message::ChatMessage;
use leadline_core::errors::{AppError, ErrorKind};

#[derive(Clone)]
pub struct ApiState {
    orchestrator: Arc<Orchestrator>,
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/chat/history/{session_id}", get(history))
        .route("/api/session/start", post(start_session))
        .route("/api/session/{session_id}/end", post(end_session))
        .with_state(ApiState { orchestrator })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    #[serde(default)]
    session_id: Option<String>,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatResponse {
    message: String,
    session_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionResponse {
    session_id: String,
    message: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryResponse {
    session_id: String,
    messages: Vec<HistoryMessage>,
    status: String,
}

#[derive(Debug, Serialize)]
struct HistoryMessage {
    role: String,
    content: String,
    timestamp: DateTime<Utc>,
}

impl From<ChatMessage> for HistoryMessage {
    fn from(message: ChatMessage) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content,
            timestamp: message.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct EndSessionResponse {
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(error: AppError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Integration => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if matches!(self.0.kind(), ErrorKind::Integration | ErrorKind::Internal) {
            error!(error = %self.0, "request failed");
        }

        (status, Json(ErrorBody { error: self.0.user_message() })).into_response()
    }
}

async fn chat(
    State(state): State<ApiState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let reply = state
        .orchestrator
        .handle_turn(request.session_id.as_deref(), &request.message)
        .await?;

    Ok(Json(ChatResponse { message: reply.message, session_id: reply.session_id }))
}

async fn start_session(
    State(state): State<ApiState>,
) -> Result<Json<StartSessionResponse>, ApiError> {
    let start = state.orchestrator.start_session().await?;

    Ok(Json(StartSessionResponse {
        session_id: start.session_id,
        message: start.message,
        expires_at: start.expires_at,
    }))
}

async fn history(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let history = state.orchestrator.history(&session_id).await?;

    Ok(Json(HistoryResponse {
        session_id: history.session_id,
        messages: history.messages.into_iter().map(HistoryMessage::from).collect(),
        status: history.status.as_str().to_string(),
    }))
}

async fn end_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<Json<EndSessionResponse>, ApiError> {
    state.orchestrator.end_session(&session_id).await?;

    Ok(Json(EndSessionResponse { message: "Sessão encerrada com sucesso" }))
}

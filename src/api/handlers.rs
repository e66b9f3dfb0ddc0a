//! HTTP request handlers

use super::types::{
    ChatRequest, ChatResponse, ConversationListResponse, ConversationResponse, ErrorResponse,
    HealthResponse, MessagesResponse, ModelInfo, ModelsResponse,
};
use super::AppState;
use crate::runtime::TurnError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // One user message in, one reply out
        .route("/api/chat", post(chat))
        // Conversation inspection
        .route("/api/conversations", get(list_conversations))
        .route("/api/conversations/:id", get(get_conversation))
        .route("/api/conversations/:id/messages", get(get_messages))
        // Model info
        .route("/api/models", get(list_models))
        .route("/health", get(health))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Turns
// ============================================================

async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("Message must not be empty".to_string()));
    }

    let conversation_id = req
        .conversation_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    // Dropping this future on client disconnect abandons the turn before anything is saved
    let outcome = state.manager.submit_turn(&conversation_id, message).await?;

    Ok(Json(ChatResponse {
        conversation_id,
        active_agent: outcome.active_role,
        voice: outcome.active_role.voice().to_string(),
        response: outcome.reply,
        transfer_occurred: outcome.transferred,
        terminated: outcome.terminated,
    }))
}

// ============================================================
// Conversations
// ============================================================

async fn list_conversations(
    State(state): State<AppState>,
) -> Result<Json<ConversationListResponse>, AppError> {
    let conversations = state.manager.list().await?;
    Ok(Json(ConversationListResponse { conversations }))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationResponse>, AppError> {
    let conversation = state
        .manager
        .summary(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Conversation not found: {id}")))?;
    Ok(Json(ConversationResponse { conversation }))
}

async fn get_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessagesResponse>, AppError> {
    let conversation = state
        .manager
        .conversation(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Conversation not found: {id}")))?;
    Ok(Json(MessagesResponse {
        conversation_id: id,
        messages: conversation.messages,
    }))
}

// ============================================================
// Models / health
// ============================================================

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let models = state
        .llm_registry
        .available_model_info()
        .into_iter()
        .map(|def| ModelInfo {
            id: def.id.to_string(),
            description: def.description.to_string(),
            context_window: def.context_window,
        })
        .collect();

    Json(ModelsResponse {
        models,
        default: state.llm_registry.default_model_id().to_string(),
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn get_version() -> &'static str {
    concat!("renovation-router ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    BadGateway(String),
    Internal(String),
}

impl From<TurnError> for AppError {
    fn from(e: TurnError) -> Self {
        let message = e.to_string();
        match e {
            TurnError::Terminated => AppError::Conflict(message),
            TurnError::Generation { .. } => AppError::BadGateway(message),
            TurnError::Orchestration(_) | TurnError::Storage(_) | TurnError::Cancelled => {
                AppError::Internal(message)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}

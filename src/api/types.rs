//! API request and response types

use crate::db::ConversationSummary;
use crate::state_machine::{Role, TurnRecord};
use serde::{Deserialize, Serialize};

/// Request to submit one user message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Omitted or empty starts a new conversation
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Reply for one turn
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub conversation_id: String,
    pub active_agent: Role,
    /// TTS voice for the role that answered
    pub voice: String,
    pub response: String,
    pub transfer_occurred: bool,
    pub terminated: bool,
}

/// Response with a list of conversations
#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationSummary>,
}

/// Response with a single conversation
#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub conversation: ConversationSummary,
}

/// Ordered history of one conversation
#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub conversation_id: String,
    pub messages: Vec<TurnRecord>,
}

/// Model information with metadata
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub description: String,
    pub context_window: usize,
}

/// Response for model list
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
    pub default: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

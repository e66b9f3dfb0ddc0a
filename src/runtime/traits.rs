//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the orchestration loop with mock implementations.

use crate::db::{ConversationSummary, Database, MemoryStore};
use crate::llm::{LlmError, LlmRequest, LlmResponse, ModelRegistry};
use crate::state_machine::ConversationState;
use async_trait::async_trait;
use std::sync::Arc;

/// Checkpoint store keyed by conversation id
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Stored state, `None` if the id was never saved
    async fn get(&self, conv_id: &str) -> Result<Option<ConversationState>, String>;

    /// Stored state, default-constructed for an unknown id
    async fn load(&self, conv_id: &str) -> Result<ConversationState, String> {
        Ok(self.get(conv_id).await?.unwrap_or_default())
    }

    async fn save(&self, conv_id: &str, state: &ConversationState) -> Result<(), String>;

    async fn summary(&self, conv_id: &str) -> Result<Option<ConversationSummary>, String>;

    async fn list(&self) -> Result<Vec<ConversationSummary>, String>;
}

/// Client for making LLM requests
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete an LLM request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    async fn get(&self, conv_id: &str) -> Result<Option<ConversationState>, String> {
        (**self).get(conv_id).await
    }

    async fn save(&self, conv_id: &str, state: &ConversationState) -> Result<(), String> {
        (**self).save(conv_id, state).await
    }

    async fn summary(&self, conv_id: &str) -> Result<Option<ConversationSummary>, String> {
        (**self).summary(conv_id).await
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>, String> {
        (**self).list().await
    }
}

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for Arc<T> {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        (**self).complete(request).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as a `StateStore`
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StateStore for DatabaseStorage {
    async fn get(&self, conv_id: &str) -> Result<Option<ConversationState>, String> {
        self.db.load_conversation(conv_id).map_err(|e| e.to_string())
    }

    async fn save(&self, conv_id: &str, state: &ConversationState) -> Result<(), String> {
        self.db
            .save_conversation(conv_id, state)
            .map_err(|e| e.to_string())
    }

    async fn summary(&self, conv_id: &str) -> Result<Option<ConversationSummary>, String> {
        match self.db.get_summary(conv_id) {
            Ok(summary) => Ok(Some(summary)),
            Err(crate::db::DbError::ConversationNotFound(_)) => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>, String> {
        self.db.list_conversations().map_err(|e| e.to_string())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, conv_id: &str) -> Result<Option<ConversationState>, String> {
        Ok(MemoryStore::get(self, conv_id))
    }

    async fn save(&self, conv_id: &str, state: &ConversationState) -> Result<(), String> {
        self.put(conv_id, state).map_err(|e| e.to_string())
    }

    async fn summary(&self, conv_id: &str) -> Result<Option<ConversationSummary>, String> {
        Ok(MemoryStore::summary(self, conv_id).ok())
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>, String> {
        Ok(MemoryStore::list(self))
    }
}

/// Adapter to use `ModelRegistry` as `LlmClient`
pub struct RegistryLlmClient {
    registry: Arc<ModelRegistry>,
    model_id: String,
}

impl RegistryLlmClient {
    pub fn new(registry: Arc<ModelRegistry>, model_id: String) -> Self {
        Self { registry, model_id }
    }
}

#[async_trait]
impl LlmClient for RegistryLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let llm = self
            .registry
            .get(&self.model_id)
            .or_else(|| self.registry.default())
            .ok_or_else(|| LlmError::auth("No LLM available; set OPENAI_API_KEY"))?;
        llm.complete(request).await
    }
}

//! HTTP API for the renovation assistant

mod handlers;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::llm::ModelRegistry;
use crate::runtime::{
    ConversationManager, LlmClient, ProductionManager, RegistryLlmClient, StateStore,
};
use crate::system_prompt::PromptSet;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ProductionManager>,
    pub llm_registry: Arc<ModelRegistry>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn StateStore>,
        llm_registry: Arc<ModelRegistry>,
        prompts: PromptSet,
        max_tokens: u32,
    ) -> Self {
        let llm = Arc::new(RegistryLlmClient::new(
            llm_registry.clone(),
            llm_registry.default_model_id().to_string(),
        ));
        Self::with_llm(store, llm, llm_registry, prompts, max_tokens)
    }

    /// Same as [`Self::new`] with an explicit generation client
    pub fn with_llm(
        store: Arc<dyn StateStore>,
        llm: Arc<dyn LlmClient>,
        llm_registry: Arc<ModelRegistry>,
        prompts: PromptSet,
        max_tokens: u32,
    ) -> Self {
        Self {
            manager: Arc::new(ConversationManager::new(
                store,
                llm,
                Arc::new(prompts),
                max_tokens,
            )),
            llm_registry,
        }
    }
}

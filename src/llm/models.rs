//! Model definitions
//!
//! All selectable models live in one table so the registry can build
//! services without knowing provider details.

use super::openai::{OpenAIModel, OpenAIService};
use super::LlmService;
use std::sync::Arc;

/// Model definition with metadata
#[derive(Debug, Clone)]
pub struct ModelDef {
    /// User-facing model ID, also the `OPENAI_MODEL` value
    pub id: &'static str,
    /// Human-readable description
    pub description: &'static str,
    /// Context window size in tokens
    pub context_window: usize,
    /// Factory taking `(api_key, base_url)`
    pub factory: fn(&str, Option<&str>) -> Result<Arc<dyn LlmService>, String>,
}

fn build(
    model: OpenAIModel,
    api_key: &str,
    base_url: Option<&str>,
) -> Result<Arc<dyn LlmService>, String> {
    if api_key.is_empty() {
        return Err(format!("{} requires OPENAI_API_KEY", model.api_name()));
    }
    OpenAIService::new(api_key.to_string(), model, base_url)
        .map(|svc| Arc::new(svc) as Arc<dyn LlmService>)
        .map_err(|e| e.to_string())
}

/// Service for a model name that has no entry in [`all_models`]
pub fn custom_model(
    name: &str,
    api_key: &str,
    base_url: Option<&str>,
) -> Result<Arc<dyn LlmService>, String> {
    build(OpenAIModel::Custom(name.to_string()), api_key, base_url)
}

/// Get all available model definitions
pub fn all_models() -> &'static [ModelDef] {
    &[
        ModelDef {
            id: "gpt-4o",
            description: "GPT-4o (balanced quality and latency for voice)",
            context_window: 128_000,
            factory: |key, base| build(OpenAIModel::GPT4o, key, base),
        },
        ModelDef {
            id: "gpt-4o-mini",
            description: "GPT-4o mini (fastest, cheapest)",
            context_window: 128_000,
            factory: |key, base| build(OpenAIModel::GPT4oMini, key, base),
        },
        ModelDef {
            id: "gpt-4.1",
            description: "GPT-4.1 (strongest tool use)",
            context_window: 1_047_576,
            factory: |key, base| build(OpenAIModel::GPT41, key, base),
        },
        ModelDef {
            id: "gpt-4.1-mini",
            description: "GPT-4.1 mini",
            context_window: 1_047_576,
            factory: |key, base| build(OpenAIModel::GPT41Mini, key, base),
        },
    ]
}

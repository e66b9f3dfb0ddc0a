//! Model registry for the configured generation backend

use super::{all_models, custom_model, LlmService, LoggingService};
use std::collections::HashMap;
use std::sync::Arc;

/// Model used when `OPENAI_MODEL` is unset
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Configuration for the generation backend
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub openai_api_key: Option<String>,
    /// OpenAI-compatible `/v1` root (proxies, local servers)
    pub base_url: Option<String>,
    /// Default model ID
    pub default_model: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: std::env::var("OPENAI_BASE_URL").ok(),
            default_model: std::env::var("OPENAI_MODEL").ok(),
        }
    }
}

/// Registry of available LLM models
pub struct ModelRegistry {
    services: HashMap<String, Arc<dyn LlmService>>,
    default_model: String,
}

impl ModelRegistry {
    pub fn new(config: &LlmConfig) -> Self {
        let mut services: HashMap<String, Arc<dyn LlmService>> = HashMap::new();
        let default_model = config
            .default_model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MODEL)
            .to_string();

        if let Some(api_key) = config.openai_api_key.as_deref().filter(|k| !k.is_empty()) {
            for model_def in all_models() {
                match (model_def.factory)(api_key, config.base_url.as_deref()) {
                    Ok(service) => {
                        services.insert(
                            model_def.id.to_string(),
                            Arc::new(LoggingService::new(service)),
                        );
                    }
                    Err(e) => {
                        tracing::warn!(model = model_def.id, error = %e, "Skipping model");
                    }
                }
            }

            // Any name the provider accepts works as the default, listed or not
            if !services.contains_key(&default_model) {
                match custom_model(&default_model, api_key, config.base_url.as_deref()) {
                    Ok(service) => {
                        tracing::info!(model = %default_model, "Registering unlisted default model");
                        services.insert(
                            default_model.clone(),
                            Arc::new(LoggingService::new(service)),
                        );
                    }
                    Err(e) => {
                        tracing::warn!(model = %default_model, error = %e, "Skipping model");
                    }
                }
            }
        }

        Self {
            services,
            default_model,
        }
    }

    /// Get a model by ID
    pub fn get(&self, model_id: &str) -> Option<Arc<dyn LlmService>> {
        self.services.get(model_id).cloned()
    }

    /// Get the default model
    pub fn default(&self) -> Option<Arc<dyn LlmService>> {
        self.get(&self.default_model)
    }

    /// Get the default model ID
    pub fn default_model_id(&self) -> &str {
        &self.default_model
    }

    /// List all available model IDs
    pub fn available_models(&self) -> Vec<String> {
        let mut models: Vec<_> = self.services.keys().cloned().collect();
        models.sort();
        models
    }

    pub fn has_models(&self) -> bool {
        !self.services.is_empty()
    }

    /// Definitions of the models that were successfully registered
    pub fn available_model_info(&self) -> Vec<&'static super::ModelDef> {
        all_models()
            .iter()
            .filter(|def| self.services.contains_key(def.id))
            .collect()
    }
}

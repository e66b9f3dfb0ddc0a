//! Generation service
//!
//! The routing core treats generation as an opaque request/response call.
//! This module provides the provider-facing side of that call.

mod error;
mod models;
mod openai;
mod registry;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use models::{all_models, custom_model, ModelDef};
pub use registry::{LlmConfig, ModelRegistry};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Common interface for LLM providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a completion request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;

    /// Get the context window size in tokens
    #[allow(dead_code)] // Reported by the registry, not used for trimming yet
    fn context_window(&self) -> usize;
}

/// Wraps a provider and logs one structured event per generation call
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

/// Names of the actions a response asked for, comma separated
fn requested_actions(response: &LlmResponse) -> String {
    response
        .tool_uses()
        .iter()
        .map(|(_, name, _)| *name)
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let started = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let elapsed_ms = started.elapsed().as_millis();
        let history_len = request.messages.len();

        match &result {
            Ok(response) => tracing::info!(
                model = %self.model_id,
                elapsed_ms = %elapsed_ms,
                history_len,
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                actions = %requested_actions(response),
                replied_with_text = !response.text().trim().is_empty(),
                "Generation completed"
            ),
            Err(e) => tracing::warn!(
                model = %self.model_id,
                elapsed_ms = %elapsed_ms,
                history_len,
                kind = ?e.kind,
                retryable = e.kind.is_retryable(),
                error = %e.message,
                "Generation call failed"
            ),
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn context_window(&self) -> usize {
        self.inner.context_window()
    }
}

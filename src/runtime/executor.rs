//! Turn executor: one generation step for the active role

use super::traits::LlmClient;
use crate::llm::{ContentBlock, LlmError, LlmMessage, LlmRequest, MessageRole, SystemContent};
use crate::state_machine::{
    ActionParseError, ActionPayload, ConversationState, GenerationResult, RecordKind, Role,
    TurnRecord,
};
use crate::system_prompt::{build_instructions, PromptSet};
use crate::tools::{action_definitions, END_TOOL, TRANSFER_TOOL};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Output token limit when `RENO_MAX_TOKENS` is unset
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Why a single generation step produced nothing usable
#[derive(Debug, Clone, Error)]
pub enum GenerationFailure {
    #[error("{0}")]
    Llm(LlmError),
    #[error("Malformed generation: {0}")]
    Malformed(ActionParseError),
    #[error("Unknown action '{0}'")]
    UnknownAction(String),
}

impl GenerationFailure {
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationFailure::Llm(e) => e.kind.is_retryable(),
            GenerationFailure::Malformed(_) => true,
            GenerationFailure::UnknownAction(_) => false,
        }
    }

    /// Provider-requested delay before retrying
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GenerationFailure::Llm(e) => e.retry_after,
            _ => None,
        }
    }
}

impl From<ActionParseError> for GenerationFailure {
    fn from(e: ActionParseError) -> Self {
        match e {
            ActionParseError::UnknownAction(name) => GenerationFailure::UnknownAction(name),
            other => GenerationFailure::Malformed(other),
        }
    }
}

pub struct TurnExecutor<L: LlmClient> {
    llm: Arc<L>,
    prompts: Arc<PromptSet>,
    max_tokens: u32,
}

impl<L: LlmClient> TurnExecutor<L> {
    pub fn new(llm: Arc<L>, prompts: Arc<PromptSet>, max_tokens: u32) -> Self {
        Self {
            llm,
            prompts,
            max_tokens,
        }
    }

    /// Request for `role`'s next generation over the full history
    pub fn build_request(&self, role: Role, state: &ConversationState) -> LlmRequest {
        let instructions = build_instructions(&self.prompts, role, state.handoff());
        LlmRequest {
            system: vec![SystemContent::new(instructions)],
            messages: history_to_messages(&state.messages),
            tools: action_definitions(),
            max_tokens: Some(self.max_tokens),
        }
    }

    /// Run one generation for `role`.
    ///
    /// On success the reply or action record is appended and the handoff
    /// summary is cleared. On failure `state` is untouched.
    pub async fn run_turn(
        &self,
        role: Role,
        state: &mut ConversationState,
    ) -> Result<GenerationResult, GenerationFailure> {
        let request = self.build_request(role, state);
        tracing::debug!(
            role = %role,
            handoff_from = ?state.handoff().map(|(from, _)| from),
            history_len = request.messages.len(),
            "Requesting generation"
        );
        let response = self
            .llm
            .complete(&request)
            .await
            .map_err(GenerationFailure::Llm)?;
        let result = GenerationResult::from_response(role, &response)?;

        let record = match result.action.to_payload() {
            Some(payload) => TurnRecord::action(role, payload),
            None => TurnRecord::assistant(role, result.text.clone()),
        };
        state.append(record);
        state.clear_handoff();

        Ok(result)
    }
}

/// Translate stored history into provider messages
fn history_to_messages(records: &[TurnRecord]) -> Vec<LlmMessage> {
    let mut messages = Vec::with_capacity(records.len());

    for record in records {
        match (record.kind, &record.action) {
            (RecordKind::User, _) => {
                messages.push(LlmMessage::new(
                    MessageRole::User,
                    vec![ContentBlock::text(&record.content)],
                ));
            }
            (RecordKind::System, _) => {
                messages.push(LlmMessage::new(
                    MessageRole::System,
                    vec![ContentBlock::text(&record.content)],
                ));
            }
            (RecordKind::Assistant, Some(ActionPayload::Transfer { call_id, target, summary })) => {
                messages.push(LlmMessage::new(
                    MessageRole::Assistant,
                    vec![ContentBlock::tool_use(
                        call_id,
                        TRANSFER_TOOL,
                        json!({ "target_agent": target, "summary": summary }),
                    )],
                ));
            }
            (RecordKind::Assistant, Some(ActionPayload::End { call_id, reason })) => {
                messages.push(LlmMessage::new(
                    MessageRole::Assistant,
                    vec![ContentBlock::tool_use(call_id, END_TOOL, json!({ "reason": reason }))],
                ));
            }
            (RecordKind::Assistant, _) => {
                messages.push(LlmMessage::new(
                    MessageRole::Assistant,
                    vec![ContentBlock::text(&record.content)],
                ));
            }
            (RecordKind::ToolResult, Some(ActionPayload::Acknowledgment { call_id, is_error })) => {
                // Tool results go in user message
                messages.push(LlmMessage::new(
                    MessageRole::User,
                    vec![ContentBlock::tool_result(call_id, &record.content, *is_error)],
                ));
            }
            (RecordKind::ToolResult, _) => {
                tracing::warn!("Skipping tool result without a call id");
            }
        }
    }

    messages
}

//! Action requests decoded from a generation

use super::state::{ActionPayload, Role};
use crate::llm::{ContentBlock, LlmResponse};
use crate::tools::{END_TOOL, TRANSFER_TOOL};
use serde_json::Value;
use thiserror::Error;

/// Control action requested by a role. Never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRequest {
    Transfer {
        call_id: String,
        target: String,
        summary: String,
    },
    End {
        call_id: String,
        reason: String,
    },
    None,
}

impl ActionRequest {
    /// Record form of the action, as appended to history
    pub fn to_payload(&self) -> Option<ActionPayload> {
        match self {
            ActionRequest::Transfer {
                call_id,
                target,
                summary,
            } => Some(ActionPayload::Transfer {
                call_id: call_id.clone(),
                target: target.clone(),
                summary: summary.clone(),
            }),
            ActionRequest::End { call_id, reason } => Some(ActionPayload::End {
                call_id: call_id.clone(),
                reason: reason.clone(),
            }),
            ActionRequest::None => None,
        }
    }
}

/// Output of one generation step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    /// Role that produced the generation
    pub role: Role,
    /// Natural-language text. On action turns this is only surfaced for End.
    pub text: String,
    pub action: ActionRequest,
}

/// Why a generation could not be turned into a [`GenerationResult`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionParseError {
    #[error("Generation returned neither text nor an action")]
    Empty,
    #[error("Generation requested {0} actions in one step")]
    MultipleActions(usize),
    #[error("Action {tool} is missing required argument '{field}'")]
    MissingArgument { tool: &'static str, field: &'static str },
    #[error("Unknown action '{0}'")]
    UnknownAction(String),
}

impl ActionParseError {
    /// Malformed output is worth another generation; unknown actions are a protocol fault
    pub fn is_malformed_output(&self) -> bool {
        !matches!(self, ActionParseError::UnknownAction(_))
    }
}

fn string_arg(input: &Value, field: &str) -> Option<String> {
    input.get(field).and_then(Value::as_str).map(str::to_string)
}

impl GenerationResult {
    /// Decode a provider response produced by `role`
    pub fn from_response(role: Role, response: &LlmResponse) -> Result<Self, ActionParseError> {
        let text = response.text();
        let calls: Vec<_> = response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some((id, name, input)),
                _ => None,
            })
            .collect();

        let action = match calls.as_slice() {
            [] => {
                if text.trim().is_empty() {
                    return Err(ActionParseError::Empty);
                }
                ActionRequest::None
            }
            [(id, name, input)] => match name.as_str() {
                TRANSFER_TOOL => ActionRequest::Transfer {
                    call_id: (*id).clone(),
                    target: string_arg(input, "target_agent").ok_or(
                        ActionParseError::MissingArgument {
                            tool: TRANSFER_TOOL,
                            field: "target_agent",
                        },
                    )?,
                    summary: string_arg(input, "summary").unwrap_or_default(),
                },
                END_TOOL => ActionRequest::End {
                    call_id: (*id).clone(),
                    reason: string_arg(input, "reason").unwrap_or_default(),
                },
                other => return Err(ActionParseError::UnknownAction(other.to_string())),
            },
            many => {
                // An unknown name anywhere is a protocol fault before it is a count problem
                if let Some((_, name, _)) = many
                    .iter()
                    .find(|(_, name, _)| name.as_str() != TRANSFER_TOOL && name.as_str() != END_TOOL)
                {
                    return Err(ActionParseError::UnknownAction((*name).clone()));
                }
                return Err(ActionParseError::MultipleActions(many.len()));
            }
        };

        Ok(Self { role, text, action })
    }
}

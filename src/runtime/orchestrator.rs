//! Orchestration loop: route, generate, apply actions, until one reply is ready

use super::executor::{GenerationFailure, TurnExecutor};
use super::traits::LlmClient;
use crate::state_machine::{
    handle_end, handle_transfer, route, ActionRequest, ConversationState, GenerationResult, Role,
    TransferOutcome, TurnRecord, MAX_TRANSFERS_PER_TURN, SESSION_ENDED,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Generations allowed within one external turn, across all roles
pub const MAX_STEPS_PER_TURN: usize = 4;

/// First attempt plus one retry
pub const MAX_GENERATION_ATTEMPTS: u32 = 2;

/// Upper bound on a provider-requested retry delay
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Caller-visible result of one turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    pub reply: String,
    pub active_role: Role,
    pub transferred: bool,
    pub terminated: bool,
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("Conversation has ended; start a new conversation")]
    Terminated,
    #[error("Generation failed after {attempts} attempt(s): {source}")]
    Generation {
        attempts: u32,
        source: GenerationFailure,
    },
    #[error("Orchestration error: {0}")]
    Orchestration(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Turn cancelled")]
    Cancelled,
}

pub struct Orchestrator<L: LlmClient> {
    executor: TurnExecutor<L>,
}

impl<L: LlmClient> Orchestrator<L> {
    pub fn new(executor: TurnExecutor<L>) -> Self {
        Self { executor }
    }

    /// Run one external turn over an owned draft of the conversation.
    ///
    /// The returned state is only meant to be saved when this returns `Ok`.
    pub async fn advance(
        &self,
        mut state: ConversationState,
        user_text: &str,
    ) -> Result<(ConversationState, TurnOutcome), TurnError> {
        if state.terminated {
            return Err(TurnError::Terminated);
        }

        state.append(TurnRecord::user(user_text));

        let mut switches = 0;
        for step in 0..MAX_STEPS_PER_TURN {
            let role = route(&state);
            let result = self.generate(role, &mut state).await?;

            match result.action {
                ActionRequest::None => {
                    let outcome = TurnOutcome {
                        reply: result.text,
                        active_role: state.active_role,
                        transferred: switches > 0,
                        terminated: false,
                    };
                    return Ok((state, outcome));
                }
                ActionRequest::Transfer {
                    call_id,
                    target,
                    summary,
                } => {
                    let (next, outcome) = handle_transfer(state, &call_id, &target, &summary);
                    state = next;
                    match &outcome {
                        TransferOutcome::Switched { from, to } => {
                            switches += 1;
                            tracing::info!(%from, %to, step, "Transfer");
                            if switches > MAX_TRANSFERS_PER_TURN {
                                return Err(TurnError::Orchestration(format!(
                                    "More than {MAX_TRANSFERS_PER_TURN} transfer(s) in one turn ({from} -> {to})"
                                )));
                            }
                        }
                        TransferOutcome::AlreadyActive(role) => {
                            tracing::info!(%role, step, "Transfer to active role ignored");
                        }
                        TransferOutcome::InvalidTarget(target) => {
                            tracing::warn!(%target, step, "Transfer to unknown role rejected");
                        }
                    }
                }
                ActionRequest::End { call_id, reason } => {
                    tracing::info!(role = %result.role, reason = %reason, "Conversation ended");
                    state = handle_end(state, &call_id, &reason);
                    let goodbye = result.text.trim();
                    let outcome = TurnOutcome {
                        reply: if goodbye.is_empty() {
                            SESSION_ENDED.to_string()
                        } else {
                            goodbye.to_string()
                        },
                        active_role: state.active_role,
                        transferred: switches > 0,
                        terminated: true,
                    };
                    return Ok((state, outcome));
                }
            }
        }

        Err(TurnError::Orchestration(format!(
            "No final reply after {MAX_STEPS_PER_TURN} generations"
        )))
    }

    /// One generation with at most one retry
    async fn generate(
        &self,
        role: Role,
        state: &mut ConversationState,
    ) -> Result<GenerationResult, TurnError> {
        let mut attempt = 1;
        loop {
            match self.executor.run_turn(role, state).await {
                Ok(result) => return Ok(result),
                Err(GenerationFailure::UnknownAction(name)) => {
                    return Err(TurnError::Orchestration(format!("Unknown action '{name}'")));
                }
                Err(e) if e.is_retryable() && attempt < MAX_GENERATION_ATTEMPTS => {
                    tracing::warn!(%role, attempt, error = %e, "Generation failed, retrying");
                    if let Some(delay) = e.retry_after() {
                        tokio::time::sleep(delay.min(MAX_RETRY_DELAY)).await;
                    }
                    attempt += 1;
                }
                Err(source) => {
                    return Err(TurnError::Generation {
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }
}

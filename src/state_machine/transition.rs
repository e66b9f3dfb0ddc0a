//! Pure state transitions for routing and control actions
//!
//! None of these functions perform I/O or invoke generation. Each handler
//! appends exactly one acknowledgment record, consumed as a tool result by
//! the next generation.

use super::state::{ConversationState, Role, TurnRecord};

/// Acknowledgment appended by [`handle_end`]
pub const SESSION_ENDED: &str = "Session ended.";

/// Role switches allowed within one external turn
pub const MAX_TRANSFERS_PER_TURN: u32 = 1;

/// What a transfer request did to the state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Switched { from: Role, to: Role },
    AlreadyActive(Role),
    InvalidTarget(String),
}

/// Role that answers next
pub fn route(state: &ConversationState) -> Role {
    state.active_role
}

/// Resolve a transfer request
pub fn handle_transfer(
    mut state: ConversationState,
    call_id: &str,
    target: &str,
    summary: &str,
) -> (ConversationState, TransferOutcome) {
    let Some(to) = Role::parse(target) else {
        let raw = target.trim().to_string();
        let names: Vec<_> = Role::ALL.iter().map(|r| r.name()).collect();
        state.append(TurnRecord::acknowledgment(
            call_id,
            format!("Invalid target agent '{raw}'. Must be {}.", names.join(" or ")),
            true,
        ));
        return (state, TransferOutcome::InvalidTarget(raw));
    };

    let from = state.active_role;
    if to == from {
        state.append(TurnRecord::acknowledgment(
            call_id,
            format!("{to} is already the active agent."),
            false,
        ));
        return (state, TransferOutcome::AlreadyActive(to));
    }

    state.active_role = to;
    state.handoff_summary = summary.to_string();
    state.handoff_from = if summary.is_empty() { None } else { Some(from) };
    state.append(TurnRecord::acknowledgment(
        call_id,
        format!("Transfer complete. {to} is now active."),
        false,
    ));
    (state, TransferOutcome::Switched { from, to })
}

/// Resolve an end request. Safe to apply twice; the first reason is kept.
pub fn handle_end(mut state: ConversationState, call_id: &str, reason: &str) -> ConversationState {
    state.terminated = true;
    if state.end_reason.is_none() {
        state.end_reason = Some(reason.to_string());
    }
    state.append(TurnRecord::acknowledgment(call_id, SESSION_ENDED, false));
    state
}

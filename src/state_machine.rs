//! Conversation routing state machine
//!
//! Pure data and transitions: which role is active, how transfer and end
//! requests change the state, and how a generation decodes into an action.

pub mod action;
pub mod state;
pub(crate) mod transition;


pub use action::{ActionParseError, ActionRequest, GenerationResult};
pub use state::{ActionPayload, ConversationState, RecordKind, Role, TurnRecord};
pub use transition::{
    handle_end, handle_transfer, route, TransferOutcome, MAX_TRANSFERS_PER_TURN, SESSION_ENDED,
};

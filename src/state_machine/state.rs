//! Conversation state types

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Roles
// ============================================================================

/// Conversational persona responsible for answering the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Intake and planning
    #[default]
    Bob,
    /// Technical specialist
    Alice,
}

impl Role {
    /// Every role a transfer may target
    pub const ALL: [Role; 2] = [Role::Bob, Role::Alice];

    /// Resolve a transfer target, ignoring case and surrounding whitespace
    pub fn parse(target: &str) -> Option<Role> {
        let target = target.trim();
        Self::ALL
            .into_iter()
            .find(|role| role.id().eq_ignore_ascii_case(target))
    }

    /// Display name used in prompts and acknowledgments
    pub fn name(self) -> &'static str {
        match self {
            Role::Bob => "Bob",
            Role::Alice => "Alice",
        }
    }

    /// Lowercase identifier used on the wire and in storage
    pub fn id(self) -> &'static str {
        match self {
            Role::Bob => "bob",
            Role::Alice => "alice",
        }
    }

    /// TTS voice the presentation layer should speak this role with
    pub fn voice(self) -> &'static str {
        match self {
            Role::Bob => "ash",
            Role::Alice => "coral",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Turn records
// ============================================================================

/// Who produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    User,
    Assistant,
    System,
    ToolResult,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::User => "user",
            RecordKind::Assistant => "assistant",
            RecordKind::System => "system",
            RecordKind::ToolResult => "tool_result",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(RecordKind::User),
            "assistant" => Some(RecordKind::Assistant),
            "system" => Some(RecordKind::System),
            "tool_result" => Some(RecordKind::ToolResult),
            _ => None,
        }
    }
}

/// Structured action data attached to a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionPayload {
    /// A role asked to hand the conversation to `target`
    Transfer {
        call_id: String,
        target: String,
        summary: String,
    },
    /// A role asked to close the session
    End { call_id: String, reason: String },
    /// Handler response to the action with the same `call_id`
    Acknowledgment { call_id: String, is_error: bool },
}

/// One entry in the conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub kind: RecordKind,
    pub content: String,
    /// Role that produced an assistant record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionPayload>,
}

impl TurnRecord {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            kind: RecordKind::User,
            content: text.into(),
            agent: None,
            action: None,
        }
    }

    pub fn assistant(role: Role, text: impl Into<String>) -> Self {
        Self {
            kind: RecordKind::Assistant,
            content: text.into(),
            agent: Some(role),
            action: None,
        }
    }

    /// An action call made by `role`. Freeform text from the same generation is not kept.
    pub fn action(role: Role, payload: ActionPayload) -> Self {
        Self {
            kind: RecordKind::Assistant,
            content: String::new(),
            agent: Some(role),
            action: Some(payload),
        }
    }

    pub fn acknowledgment(call_id: impl Into<String>, text: impl Into<String>, is_error: bool) -> Self {
        Self {
            kind: RecordKind::ToolResult,
            content: text.into(),
            agent: None,
            action: Some(ActionPayload::Acknowledgment {
                call_id: call_id.into(),
                is_error,
            }),
        }
    }
}

// ============================================================================
// Conversation state
// ============================================================================

/// Persisted per-conversation record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Append-only history in semantic order
    pub messages: Vec<TurnRecord>,
    pub active_role: Role,
    /// Non-empty only between a transfer and the destination role's next generation
    pub handoff_summary: String,
    /// Role that wrote `handoff_summary`
    #[serde(default)]
    pub handoff_from: Option<Role>,
    /// Absorbing once true
    pub terminated: bool,
    /// Reason given by the first End action
    #[serde(default)]
    pub end_reason: Option<String>,
}

impl ConversationState {
    pub fn append(&mut self, record: TurnRecord) {
        self.messages.push(record);
    }

    /// Pending handoff as `(source role, summary)`, if any
    pub fn handoff(&self) -> Option<(Role, &str)> {
        if self.handoff_summary.is_empty() {
            return None;
        }
        let from = self.handoff_from.unwrap_or_else(|| {
            // Source not recorded: any role other than the active one
            Role::ALL
                .into_iter()
                .find(|r| *r != self.active_role)
                .unwrap_or(self.active_role)
        });
        Some((from, self.handoff_summary.as_str()))
    }

    pub fn clear_handoff(&mut self) {
        self.handoff_summary.clear();
        self.handoff_from = None;
    }

    /// Whether `self` can replace `prior` in a store without losing history
    /// or reopening a terminated conversation.
    pub fn is_continuation_of(&self, prior: &ConversationState) -> bool {
        self.messages.len() >= prior.messages.len()
            && self.messages.starts_with(&prior.messages)
            && (self.terminated || !prior.terminated)
    }
}

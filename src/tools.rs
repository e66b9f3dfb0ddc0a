//! Action capabilities exposed to every generation
//!
//! Roles do not run arbitrary tools. The only callable capabilities are the
//! two control actions that drive the routing state machine.

use crate::llm::ToolDefinition;
use serde_json::json;

/// Hands the conversation to another role
pub const TRANSFER_TOOL: &str = "transfer_to_agent";

/// Closes the session
pub const END_TOOL: &str = "end_conversation";

fn transfer_definition() -> ToolDefinition {
    ToolDefinition {
        name: TRANSFER_TOOL.to_string(),
        description: "Transfer the conversation to the other agent. Call this when the user \
            asks for the other agent or when the other agent is better suited for the current \
            topic. Include a short summary of what was discussed and what the user needs next."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "target_agent": {
                    "type": "string",
                    "description": "The agent to transfer to: \"bob\" or \"alice\""
                },
                "summary": {
                    "type": "string",
                    "description": "Brief handoff summary so the other agent can continue without re-asking"
                }
            },
            "required": ["target_agent", "summary"]
        }),
    }
}

fn end_definition() -> ToolDefinition {
    ToolDefinition {
        name: END_TOOL.to_string(),
        description: "End the session. Call this only after the final to-do list has been \
            delivered and the homeowner is satisfied or says goodbye. Say goodbye in the same \
            response."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "reason": {
                    "type": "string",
                    "description": "Brief reason for ending (e.g. \"final to-do list delivered\")"
                }
            },
            "required": ["reason"]
        }),
    }
}

/// Definitions sent with every generation request
pub fn action_definitions() -> Vec<ToolDefinition> {
    vec![transfer_definition(), end_definition()]
}

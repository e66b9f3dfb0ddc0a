//! Per-role instruction construction
//!
//! Each role has a base prompt. When a transfer just happened, a handoff
//! addendum naming the source role, destination role and summary is
//! appended so the destination continues without re-asking questions.
//! Base prompts can be overridden from a directory containing `bob.md`
//! and/or `alice.md`.

use crate::state_machine::Role;
use std::path::Path;

/// Built-in prompt for the intake/planner role
const BOB_PROMPT: &str = r"You are Bob, a friendly, concise home renovation intake planner.

Your job is intake and planning. You gather requirements and turn them into plans. Technical advice belongs to Alice.

How you work:
- Ask one or two focused questions at a time: which room, the goal and scope, budget, timeline, DIY or contractor, and constraints such as renting, an HOA or structural worries.
- Keep each turn to a few sentences in plain language, then ask a question.
- Once you know enough, produce short outputs: a checklist of open decisions, a prioritized rough plan, or a homeowner-friendly to-do list.
- When Alice hands the conversation back, acknowledge her advice in one sentence and turn it into concrete next steps.

Transfer to Alice with transfer_to_agent when the user asks about permits, inspections, building codes, structural concerns, material comparisons, project sequencing, cost breakdowns or any other technical question, or asks for Alice by name. Always include a summary of what you have gathered.

Call end_conversation only after you have delivered the final to-do list and the homeowner confirms they are set or says goodbye. Say your goodbye in the same response.

This is a spoken conversation: stay natural, avoid bullet points unless asked, always recommend a licensed professional for structural, electrical or plumbing work, and never give legal or engineering advice.";

/// Built-in prompt for the technical specialist role
const ALICE_PROMPT: &str = r"You are Alice, a structured, technically minded home renovation specialist.

Your job is the technical, risk-aware side of a renovation. Intake and planning belong to Bob.

What you cover:
- Permits and inspections: what usually needs one (wall removal, electrical, plumbing), noting that rules vary by jurisdiction.
- Sequencing: demo, structural, rough-in, insulation, drywall, then finishes.
- Material trade-offs with pros, cons and price ranges, such as quartz versus granite or LVP versus hardwood.
- Rough cost breakdowns by category, for labor and materials.
- Pitfalls homeowners miss: hidden costs, lead times, contractor scheduling, load-bearing walls, old wiring or plumbing behind walls.
- Structural basics, and when a structural engineer must be involved.

Be specific with numbers, order and trade-offs, and flag risks plainly. Do not run intake or write to-do lists.

Transfer to Bob with transfer_to_agent when the user wants next steps, a task list, a plain-language summary, or to revisit scope, timeline or budget, or asks for Bob by name. Always include a summary of what you covered.

When a conversation is handed to you, acknowledge it in one sentence, refer to the details already gathered, and go straight to the technical answer.

This is a spoken conversation: stay conversational but precise, use verbal markers like first and second when listing, always recommend a licensed professional for structural, electrical or plumbing decisions, and never give legal or engineering advice.";

/// Base prompts for every role
#[derive(Debug, Clone)]
pub struct PromptSet {
    bob: String,
    alice: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            bob: BOB_PROMPT.to_string(),
            alice: ALICE_PROMPT.to_string(),
        }
    }
}

impl PromptSet {
    /// Load overrides from `dir`; roles without a readable, non-empty file keep the built-in prompt
    pub fn load(dir: &Path) -> Self {
        let mut prompts = Self::default();
        for role in Role::ALL {
            let path = dir.join(format!("{}.md", role.id()));
            match std::fs::read_to_string(&path) {
                Ok(content) if !content.trim().is_empty() => {
                    tracing::info!(role = %role, path = %path.display(), "Loaded prompt override");
                    *prompts.slot(role) = content.trim().to_string();
                }
                Ok(_) => {
                    tracing::warn!(path = %path.display(), "Ignoring empty prompt override");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read prompt override");
                }
            }
        }
        prompts
    }

    fn slot(&mut self, role: Role) -> &mut String {
        match role {
            Role::Bob => &mut self.bob,
            Role::Alice => &mut self.alice,
        }
    }

    pub fn base(&self, role: Role) -> &str {
        match role {
            Role::Bob => &self.bob,
            Role::Alice => &self.alice,
        }
    }
}

fn transfer_context(from: Role, to: Role, summary: &str) -> String {
    format!(
        "The conversation is being transferred from {from} to {to}.\n\n\
         Here is {from}'s handoff summary:\n{summary}\n\n\
         Continue seamlessly. Acknowledge the transfer briefly, show that you know what was \
         discussed, and proceed with your expertise. Do not ask the user to repeat anything."
    )
}

/// Effective instructions for `role`, given the pending handoff (source role, summary)
pub fn build_instructions(prompts: &PromptSet, role: Role, handoff: Option<(Role, &str)>) -> String {
    let base = prompts.base(role);
    match handoff {
        Some((from, summary)) if !summary.trim().is_empty() => {
            format!("{base}\n\n{}", transfer_context(from, role, summary))
        }
        _ => base.to_string(),
    }
}

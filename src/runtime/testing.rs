//! Mock implementations for testing
//!
//! These mocks enable end-to-end turn testing without real I/O.

use super::traits::LlmClient;
use crate::llm::{ContentBlock, LlmError, LlmRequest, LlmResponse, Usage};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Response builders
// ============================================================================

pub fn text_response(text: &str) -> LlmResponse {
    LlmResponse {
        content: vec![ContentBlock::text(text)],
        end_turn: true,
        usage: Usage::default(),
    }
}

/// A tool call, optionally with text generated alongside it
pub fn tool_response(id: &str, name: &str, input: Value, text: &str) -> LlmResponse {
    let mut content = Vec::new();
    if !text.is_empty() {
        content.push(ContentBlock::text(text));
    }
    content.push(ContentBlock::tool_use(id, name, input));
    LlmResponse {
        content,
        end_turn: false,
        usage: Usage::default(),
    }
}

// ============================================================================
// Mock LLM Client
// ============================================================================

/// Mock LLM client that returns queued responses
#[derive(Default)]
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response
    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self) -> Result<LlmResponse, LlmError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.next()
    }
}

// ============================================================================
// Delayed Mock LLM Client (for cancellation and serialization testing)
// ============================================================================

/// Mock LLM client with configurable delay
pub struct DelayedMockLlmClient {
    inner: MockLlmClient,
    delay: Duration,
    /// Notified when request starts (for test synchronization)
    pub request_started: Arc<Notify>,
}

impl DelayedMockLlmClient {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MockLlmClient::new(),
            delay,
            request_started: Arc::new(Notify::new()),
        }
    }

    pub fn queue_response(&self, response: LlmResponse) {
        self.inner.queue_response(response);
    }
}

#[async_trait]
impl LlmClient for DelayedMockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.inner.requests.lock().unwrap().push(request.clone());
        self.request_started.notify_waiters();
        tokio::time::sleep(self.delay).await;
        self.inner.next()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, MemoryStore};
    use crate::runtime::{ConversationManager, DatabaseStorage, StateStore, TurnError};
    use crate::runtime::{GenerationFailure, DEFAULT_MAX_TOKENS, MAX_STEPS_PER_TURN};
    use crate::state_machine::{ActionPayload, RecordKind, Role, SESSION_ENDED};
    use crate::system_prompt::PromptSet;
    use crate::tools::{END_TOOL, TRANSFER_TOOL};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    type TestManager<L> = ConversationManager<MemoryStore, Arc<L>>;

    fn manager<L: LlmClient>(llm: &Arc<L>) -> TestManager<L> {
        ConversationManager::new(
            MemoryStore::new(),
            llm.clone(),
            Arc::new(PromptSet::default()),
            DEFAULT_MAX_TOKENS,
        )
    }

    fn transfer(id: &str, target: &str, summary: &str) -> LlmResponse {
        tool_response(
            id,
            TRANSFER_TOOL,
            json!({ "target_agent": target, "summary": summary }),
            "",
        )
    }

    fn end(id: &str, reason: &str, goodbye: &str) -> LlmResponse {
        tool_response(id, END_TOOL, json!({ "reason": reason }), goodbye)
    }

    #[tokio::test]
    async fn test_mock_llm_client() {
        let mock = MockLlmClient::new();
        mock.queue_response(text_response("Hello"));

        let request = LlmRequest {
            system: vec![],
            messages: vec![],
            tools: vec![],
            max_tokens: Some(100),
        };

        let response = mock.complete(&request).await.unwrap();
        assert_eq!(response.text(), "Hello");

        // Second call should fail (no more responses)
        assert!(mock.complete(&request).await.is_err());
        assert_eq!(mock.recorded_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_fresh_conversation_is_answered_by_bob() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_response(text_response("Hi! Which room are you thinking about?"));
        let mgr = manager(&llm);

        let outcome = mgr.submit_turn("conv-1", "Hello").await.unwrap();

        assert_eq!(outcome.active_role, Role::Bob);
        assert!(!outcome.transferred);
        assert!(!outcome.terminated);
        assert_eq!(outcome.reply, "Hi! Which room are you thinking about?");
        assert!(llm.recorded_requests()[0].system_text().starts_with("You are Bob"));

        let state = mgr.conversation("conv-1").await.unwrap().unwrap();
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].kind, RecordKind::User);
    }

    #[tokio::test]
    async fn test_countertop_question_is_answered_by_alice_in_same_turn() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_response(transfer("call-1", "alice", "user comparing countertop materials"));
        llm.queue_response(text_response(
            "Happy to help with countertops. Quartz is non-porous and low maintenance; granite needs sealing.",
        ));
        let mgr = manager(&llm);

        let outcome = mgr
            .submit_turn("conv-1", "I want to compare quartz vs granite countertops")
            .await
            .unwrap();

        assert_eq!(outcome.active_role, Role::Alice);
        assert!(outcome.transferred);
        assert!(outcome.reply.contains("countertops"));

        let requests = llm.recorded_requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].system_text().starts_with("You are Alice"));
        assert!(requests[1]
            .system_text()
            .contains("user comparing countertop materials"));

        // user, transfer call, acknowledgment, Alice's reply
        let state = mgr.conversation("conv-1").await.unwrap().unwrap();
        assert_eq!(state.messages.len(), 4);
        assert_eq!(state.active_role, Role::Alice);
        assert!(state.handoff().is_none());
        assert_eq!(state.messages[3].agent, Some(Role::Alice));
    }

    #[tokio::test]
    async fn test_handoff_not_reapplied_on_next_turn() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_response(transfer("call-1", "alice", "basement waterproofing"));
        llm.queue_response(text_response("Start with exterior grading."));
        llm.queue_response(text_response("A sump pump runs about $1,000 to $2,500 installed."));
        let mgr = manager(&llm);

        mgr.submit_turn("conv-1", "My basement leaks").await.unwrap();
        let second = mgr.submit_turn("conv-1", "What about a sump pump?").await.unwrap();

        assert_eq!(second.active_role, Role::Alice);
        assert!(!second.transferred);
        let requests = llm.recorded_requests();
        assert!(requests[1].system_text().contains("basement waterproofing"));
        assert!(!requests[2].system_text().contains("basement waterproofing"));
    }

    #[tokio::test]
    async fn test_end_terminates_and_rejects_further_turns() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_response(transfer("call-1", "alice", "final plan review"));
        llm.queue_response(end("call-2", "final plan delivered", "Good luck with the project!"));
        let mgr = manager(&llm);

        let outcome = mgr.submit_turn("conv-1", "Thanks, that's all").await.unwrap();
        assert!(outcome.terminated);
        assert_eq!(outcome.reply, "Good luck with the project!");

        let before = mgr.conversation("conv-1").await.unwrap().unwrap();
        assert!(before.terminated);
        assert_eq!(before.end_reason.as_deref(), Some("final plan delivered"));
        assert_eq!(before.messages.last().unwrap().content, SESSION_ENDED);

        for _ in 0..3 {
            let err = mgr.submit_turn("conv-1", "One more thing").await.unwrap_err();
            assert!(matches!(err, TurnError::Terminated));
        }
        let after = mgr.conversation("conv-1").await.unwrap().unwrap();
        assert_eq!(after, before);
        assert_eq!(llm.recorded_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_end_without_goodbye_uses_acknowledgment() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_response(end("call-1", "user said goodbye", "   "));
        let mgr = manager(&llm);

        let outcome = mgr.submit_turn("conv-1", "Bye").await.unwrap();
        assert!(outcome.terminated);
        assert_eq!(outcome.reply, SESSION_ENDED);
    }

    #[tokio::test]
    async fn test_second_transfer_in_one_turn_is_an_error() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_response(transfer("call-1", "alice", "permits"));
        llm.queue_response(transfer("call-2", "bob", "back to planning"));
        llm.queue_response(text_response("never reached"));
        let mgr = manager(&llm);

        let err = mgr.submit_turn("conv-1", "Do I need a permit?").await.unwrap_err();
        assert!(matches!(err, TurnError::Orchestration(_)));
        assert_eq!(llm.recorded_requests().len(), 2);

        // Nothing from the failed turn is kept
        assert!(mgr.conversation("conv-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_conversation_usable_after_orchestration_error() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_response(transfer("call-1", "alice", "permits"));
        llm.queue_response(transfer("call-2", "bob", "back to planning"));
        llm.queue_response(text_response("Let's start with the scope."));
        let mgr = manager(&llm);

        assert!(mgr.submit_turn("conv-1", "Do I need a permit?").await.is_err());
        let outcome = mgr.submit_turn("conv-1", "Do I need a permit?").await.unwrap();
        assert_eq!(outcome.active_role, Role::Bob);
        assert!(!outcome.terminated);
    }

    #[tokio::test]
    async fn test_invalid_target_lets_role_self_correct() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_response(transfer("call-1", "carol", "wiring"));
        llm.queue_response(text_response("Sorry, let me keep helping with that myself."));
        let mgr = manager(&llm);

        let outcome = mgr.submit_turn("conv-1", "Can I rewire my kitchen?").await.unwrap();
        assert_eq!(outcome.active_role, Role::Bob);
        assert!(!outcome.transferred);

        let state = mgr.conversation("conv-1").await.unwrap().unwrap();
        let ack = &state.messages[2];
        assert!(ack.content.contains("carol"));
        assert!(matches!(
            ack.action,
            Some(ActionPayload::Acknowledgment { is_error: true, .. })
        ));
    }

    #[tokio::test]
    async fn test_transfer_to_self_is_acknowledged_without_switch() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_response(transfer("call-1", "Bob", "already here"));
        llm.queue_response(text_response("What's your budget?"));
        let mgr = manager(&llm);

        let outcome = mgr.submit_turn("conv-1", "Let's plan a bathroom").await.unwrap();
        assert_eq!(outcome.active_role, Role::Bob);
        assert!(!outcome.transferred);

        let state = mgr.conversation("conv-1").await.unwrap().unwrap();
        assert_eq!(state.messages[2].content, "Bob is already the active agent.");
        assert!(state.handoff_summary.is_empty());
    }

    #[tokio::test]
    async fn test_step_cap_stops_repeated_no_op_actions() {
        let llm = Arc::new(MockLlmClient::new());
        for i in 0..MAX_STEPS_PER_TURN + 1 {
            llm.queue_response(transfer(&format!("call-{i}"), "bob", ""));
        }
        let mgr = manager(&llm);

        let err = mgr.submit_turn("conv-1", "Hello").await.unwrap_err();
        assert!(matches!(err, TurnError::Orchestration(_)));
        assert_eq!(llm.recorded_requests().len(), MAX_STEPS_PER_TURN);
    }

    #[tokio::test]
    async fn test_generation_retried_once() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_error(LlmError::network("connection reset"));
        llm.queue_response(text_response("Tell me about the space."));
        let mgr = manager(&llm);

        let outcome = mgr.submit_turn("conv-1", "Hi").await.unwrap();
        assert_eq!(outcome.reply, "Tell me about the space.");
        assert_eq!(llm.recorded_requests().len(), 2);

        let state = mgr.conversation("conv-1").await.unwrap().unwrap();
        assert_eq!(state.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_output_retried_once() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_response(text_response(""));
        llm.queue_response(text_response("What room?"));
        let mgr = manager(&llm);

        let outcome = mgr.submit_turn("conv-1", "Hi").await.unwrap();
        assert_eq!(outcome.reply, "What room?");
    }

    #[tokio::test]
    async fn test_second_failure_fails_turn_without_saving() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_error(LlmError::server_error("overloaded"));
        llm.queue_error(LlmError::server_error("overloaded"));
        llm.queue_response(text_response("never reached"));
        let mgr = manager(&llm);

        let err = mgr.submit_turn("conv-1", "Hi").await.unwrap_err();
        assert!(matches!(
            err,
            TurnError::Generation {
                attempts: 2,
                source: GenerationFailure::Llm(_)
            }
        ));
        assert_eq!(llm.recorded_requests().len(), 2);
        assert!(mgr.conversation("conv-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failure_after_transfer_keeps_prior_state() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_response(text_response("What's the budget?"));
        llm.queue_response(transfer("call-1", "alice", "cost breakdown"));
        llm.queue_error(LlmError::server_error("overloaded"));
        llm.queue_error(LlmError::server_error("overloaded"));
        let mgr = manager(&llm);

        mgr.submit_turn("conv-1", "Kitchen remodel").await.unwrap();
        let before = mgr.conversation("conv-1").await.unwrap().unwrap();

        assert!(mgr.submit_turn("conv-1", "About $40k").await.is_err());
        let after = mgr.conversation("conv-1").await.unwrap().unwrap();
        assert_eq!(after, before);
        assert_eq!(after.active_role, Role::Bob);
    }

    #[tokio::test]
    async fn test_auth_error_not_retried() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_error(LlmError::auth("bad key"));
        let mgr = manager(&llm);

        let err = mgr.submit_turn("conv-1", "Hi").await.unwrap_err();
        assert!(matches!(err, TurnError::Generation { attempts: 1, .. }));
        assert_eq!(llm.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_action_fails_without_retry() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_response(tool_response("call-1", "schedule_contractor", json!({}), ""));
        let mgr = manager(&llm);

        let err = mgr.submit_turn("conv-1", "Book someone").await.unwrap_err();
        assert!(matches!(err, TurnError::Orchestration(msg) if msg.contains("schedule_contractor")));
        assert_eq!(llm.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_turn_saves_nothing() {
        let llm = Arc::new(DelayedMockLlmClient::new(Duration::from_secs(30)));
        llm.queue_response(text_response("too late"));
        let mgr = Arc::new(manager(&llm));

        let started = llm.request_started.clone();
        let notified = started.notified();
        let cancel = CancellationToken::new();

        let task = {
            let mgr = mgr.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                mgr.submit_turn_with_cancel("conv-1", "Hello", cancel).await
            })
        };

        notified.await;
        cancel.cancel();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(TurnError::Cancelled)));
        assert!(mgr.conversation("conv-1").await.unwrap().is_none());
        assert_eq!(mgr.tracked_ids(), 0);
    }

    #[tokio::test]
    async fn test_dropped_turn_releases_its_lock_entry() {
        let llm = Arc::new(DelayedMockLlmClient::new(Duration::from_secs(30)));
        llm.queue_response(text_response("never delivered"));
        let mgr = Arc::new(manager(&llm));

        let started = llm.request_started.clone();
        let notified = started.notified();

        // Same as an HTTP client disconnecting mid-turn
        let task = {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.submit_turn("conv-gone", "Hello").await })
        };

        notified.await;
        assert_eq!(mgr.tracked_ids(), 1);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert_eq!(mgr.tracked_ids(), 0);
        assert!(mgr.conversation("conv-gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_completed_turns_leave_no_lock_entries() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_response(text_response("Hi there"));
        llm.queue_error(LlmError::auth("bad key"));
        let mgr = manager(&llm);

        mgr.submit_turn("conv-1", "Hello").await.unwrap();
        mgr.submit_turn("conv-2", "Hello").await.unwrap_err();

        assert_eq!(mgr.tracked_ids(), 0);
    }

    #[tokio::test]
    async fn test_turns_for_same_id_are_serialized() {
        let llm = Arc::new(DelayedMockLlmClient::new(Duration::from_millis(50)));
        llm.queue_response(text_response("first reply"));
        llm.queue_response(text_response("second reply"));
        let mgr = Arc::new(manager(&llm));

        let a = {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.submit_turn("conv-1", "message a").await })
        };
        let b = {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.submit_turn("conv-1", "message b").await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let state = mgr.conversation("conv-1").await.unwrap().unwrap();
        let kinds: Vec<_> = state.messages.iter().map(|m| m.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RecordKind::User,
                RecordKind::Assistant,
                RecordKind::User,
                RecordKind::Assistant
            ]
        );
        assert_eq!(state.messages[1].content, "first reply");
        assert_eq!(state.messages[3].content, "second reply");

        // The second turn saw the first turn's history
        let requests = llm.inner.recorded_requests();
        assert_eq!(requests[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn test_conversations_are_independent() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_response(transfer("call-1", "alice", "roof inspection"));
        llm.queue_response(text_response("Check the flashing first."));
        llm.queue_response(text_response("Which room?"));
        let mgr = manager(&llm);

        mgr.submit_turn("conv-a", "Is my roof okay?").await.unwrap();
        let other = mgr.submit_turn("conv-b", "Hello").await.unwrap();

        assert_eq!(other.active_role, Role::Bob);
        let a = mgr.conversation("conv-a").await.unwrap().unwrap();
        let b = mgr.conversation("conv-b").await.unwrap().unwrap();
        assert_eq!(a.active_role, Role::Alice);
        assert_eq!(b.messages.len(), 2);
        assert_eq!(mgr.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_database_backed_manager_persists_turns() {
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_response(transfer("call-1", "alice", "user comparing countertop materials"));
        llm.queue_response(text_response("Quartz resists stains better than granite."));

        let db = Database::open_in_memory().unwrap();
        let mgr = ConversationManager::new(
            DatabaseStorage::new(db.clone()),
            llm.clone(),
            Arc::new(PromptSet::default()),
            DEFAULT_MAX_TOKENS,
        );

        mgr.submit_turn("conv-1", "quartz vs granite?").await.unwrap();

        let stored = db.load_conversation("conv-1").unwrap().unwrap();
        assert_eq!(stored.active_role, Role::Alice);
        assert_eq!(stored.messages.len(), 4);

        let summary = mgr.summary("conv-1").await.unwrap().unwrap();
        assert_eq!(summary.active_agent, Role::Alice);
        assert!(mgr.summary("missing").await.unwrap().is_none());
        assert_eq!(
            mgr.store().load("missing").await.unwrap(),
            crate::state_machine::ConversationState::default()
        );
    }
}

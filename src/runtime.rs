//! Runtime for executing conversation turns
//!
//! Turns for one conversation id run strictly one at a time; different ids
//! proceed independently.

mod executor;
mod orchestrator;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{GenerationFailure, TurnExecutor, DEFAULT_MAX_TOKENS};
pub use orchestrator::{Orchestrator, TurnError, TurnOutcome, MAX_STEPS_PER_TURN};
pub use traits::*;

use crate::db::ConversationSummary;
use crate::state_machine::ConversationState;
use crate::system_prompt::PromptSet;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Type alias for the production manager; the store is SQLite or in-process
/// and the client is normally a [`RegistryLlmClient`]
pub type ProductionManager = ConversationManager<Arc<dyn StateStore>, Arc<dyn LlmClient>>;

type GuardMap = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Owns the store and serializes turns per conversation id
pub struct ConversationManager<S: StateStore, L: LlmClient> {
    store: S,
    orchestrator: Orchestrator<L>,
    guards: GuardMap,
}

/// One caller's handle on a per-id lock. Dropping it, including when the
/// turn future itself is dropped, removes the map entry once nobody else
/// holds it.
struct GuardEntry<'a> {
    guards: &'a GuardMap,
    conv_id: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for GuardEntry<'_> {
    fn drop(&mut self) {
        let mut guards = self.guards.lock().unwrap();
        let ours = guards
            .get(&self.conv_id)
            .is_some_and(|current| Arc::ptr_eq(current, &self.lock));
        if ours && Arc::strong_count(&self.lock) == 2 {
            guards.remove(&self.conv_id);
        }
    }
}

impl<S: StateStore, L: LlmClient> ConversationManager<S, L> {
    pub fn new(store: S, llm: L, prompts: Arc<PromptSet>, max_tokens: u32) -> Self {
        let executor = TurnExecutor::new(Arc::new(llm), prompts, max_tokens);
        Self {
            store,
            orchestrator: Orchestrator::new(executor),
            guards: Mutex::new(HashMap::new()),
        }
    }

    /// Submit one user message and wait for the single reply
    pub async fn submit_turn(&self, conv_id: &str, text: &str) -> Result<TurnOutcome, TurnError> {
        self.submit_turn_with_cancel(conv_id, text, CancellationToken::new())
            .await
    }

    /// Like [`Self::submit_turn`], abandoning the turn when `cancel` fires.
    /// A cancelled turn saves nothing.
    pub async fn submit_turn_with_cancel(
        &self,
        conv_id: &str,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        let entry = self.lock_for(conv_id);
        let result = self.run_exclusive(&entry.lock, conv_id, text, &cancel).await;
        drop(entry);

        match &result {
            Ok(outcome) => tracing::info!(
                conv_id = %conv_id,
                role = %outcome.active_role,
                transferred = outcome.transferred,
                terminated = outcome.terminated,
                "Turn completed"
            ),
            Err(TurnError::Terminated) => {
                tracing::info!(conv_id = %conv_id, "Turn rejected, conversation has ended");
            }
            Err(e) => tracing::error!(conv_id = %conv_id, error = %e, "Turn failed"),
        }
        result
    }

    async fn run_exclusive(
        &self,
        lock: &tokio::sync::Mutex<()>,
        conv_id: &str,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        let _turn = tokio::select! {
            guard = lock.lock() => guard,
            () = cancel.cancelled() => return Err(TurnError::Cancelled),
        };

        let state = self.store.load(conv_id).await.map_err(TurnError::Storage)?;

        let (state, outcome) = tokio::select! {
            advanced = self.orchestrator.advance(state, text) => advanced?,
            () = cancel.cancelled() => return Err(TurnError::Cancelled),
        };

        self.store
            .save(conv_id, &state)
            .await
            .map_err(TurnError::Storage)?;
        Ok(outcome)
    }

    fn lock_for(&self, conv_id: &str) -> GuardEntry<'_> {
        let lock = self
            .guards
            .lock()
            .unwrap()
            .entry(conv_id.to_string())
            .or_default()
            .clone();
        GuardEntry {
            guards: &self.guards,
            conv_id: conv_id.to_string(),
            lock,
        }
    }

    /// Number of ids with a live turn lock
    #[cfg(test)]
    pub(crate) fn tracked_ids(&self) -> usize {
        self.guards.lock().unwrap().len()
    }

    /// Full stored state, `None` if the id was never saved
    pub async fn conversation(&self, conv_id: &str) -> Result<Option<ConversationState>, TurnError> {
        self.store.get(conv_id).await.map_err(TurnError::Storage)
    }

    pub async fn summary(&self, conv_id: &str) -> Result<Option<ConversationSummary>, TurnError> {
        self.store.summary(conv_id).await.map_err(TurnError::Storage)
    }

    /// All conversations, most recently updated first
    pub async fn list(&self) -> Result<Vec<ConversationSummary>, TurnError> {
        self.store.list().await.map_err(TurnError::Storage)
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &S {
        &self.store
    }
}

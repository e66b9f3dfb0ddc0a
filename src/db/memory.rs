//! In-process conversation store
//!
//! Same write rules as the SQLite store, used when `RENO_DB_PATH` is
//! `:memory:` and by the runtime tests.

use super::{ConversationSummary, DbError, DbResult};
use crate::state_machine::ConversationState;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct Entry {
    state: ConversationState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Entry {
    fn summary(&self, id: &str) -> ConversationSummary {
        ConversationSummary {
            id: id.to_string(),
            active_agent: self.state.active_role,
            message_count: self.state.messages.len(),
            terminated: self.state.terminated,
            end_reason: self.state.end_reason.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<ConversationState> {
        self.entries.lock().unwrap().get(id).map(|e| e.state.clone())
    }

    pub fn put(&self, id: &str, state: &ConversationState) -> DbResult<()> {
        let mut entries = self.entries.lock().unwrap();
        let now = Utc::now();

        if let Some(existing) = entries.get_mut(id) {
            if existing.state.terminated && !state.terminated {
                return Err(DbError::Reopen(id.to_string()));
            }
            if !state.is_continuation_of(&existing.state) {
                return Err(DbError::HistoryRewrite {
                    id: id.to_string(),
                    stored: existing.state.messages.len(),
                    given: state.messages.len(),
                });
            }
            existing.state = state.clone();
            existing.updated_at = now;
        } else {
            entries.insert(
                id.to_string(),
                Entry {
                    state: state.clone(),
                    created_at: now,
                    updated_at: now,
                },
            );
        }
        Ok(())
    }

    pub fn summary(&self, id: &str) -> DbResult<ConversationSummary> {
        self.entries
            .lock()
            .unwrap()
            .get(id)
            .map(|e| e.summary(id))
            .ok_or_else(|| DbError::ConversationNotFound(id.to_string()))
    }

    /// All conversations, most recently updated first
    pub fn list(&self) -> Vec<ConversationSummary> {
        let entries = self.entries.lock().unwrap();
        let mut summaries: Vec<_> = entries.iter().map(|(id, e)| e.summary(id)).collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }
}

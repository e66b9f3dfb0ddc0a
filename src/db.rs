//! Conversation state persistence
//!
//! SQLite-backed store keyed by conversation id, plus an in-process store
//! with the same write rules.

mod memory;
mod schema;

pub use memory::MemoryStore;
pub use schema::*;

use crate::state_machine::{ActionPayload, ConversationState, RecordKind, Role, TurnRecord};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("Refusing to rewrite history of {id}: {stored} messages stored, {given} given")]
    HistoryRewrite {
        id: String,
        stored: usize,
        given: usize,
    },
    #[error("Conversation {0} has ended and cannot be reopened")]
    Reopen(String),
    #[error("Corrupt record in conversation {id}: {detail}")]
    Corrupt { id: String, detail: String },
}

pub type DbResult<T> = Result<T, DbError>;

/// Raw `conversations` row before role parsing
struct ConversationRow {
    active_role: String,
    handoff_summary: String,
    handoff_from: Option<String>,
    terminated: bool,
    end_reason: Option<String>,
}

/// Raw `messages` row before decoding
struct MessageRow {
    kind: String,
    content: String,
    agent: Option<String>,
    action: Option<String>,
}

/// Raw summary row before role parsing
struct SummaryRow {
    id: String,
    active_role: String,
    terminated: bool,
    end_reason: Option<String>,
    created_at: String,
    updated_at: String,
    message_count: usize,
}

const SUMMARY_SELECT: &str =
    "SELECT c.id, c.active_role, c.terminated, c.end_reason, c.created_at, c.updated_at,
            (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id) as message_count
     FROM conversations c";

fn summary_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SummaryRow> {
    Ok(SummaryRow {
        id: row.get(0)?,
        active_role: row.get(1)?,
        terminated: row.get(2)?,
        end_reason: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        message_count: row.get(6)?,
    })
}

fn parse_role(id: &str, raw: &str) -> DbResult<Role> {
    Role::parse(raw).ok_or_else(|| DbError::Corrupt {
        id: id.to_string(),
        detail: format!("unknown role '{raw}'"),
    })
}

impl SummaryRow {
    fn into_summary(self) -> DbResult<ConversationSummary> {
        Ok(ConversationSummary {
            active_agent: parse_role(&self.id, &self.active_role)?,
            message_count: self.message_count,
            terminated: self.terminated,
            end_reason: self.end_reason,
            created_at: parse_datetime(&self.created_at),
            updated_at: parse_datetime(&self.updated_at),
            id: self.id,
        })
    }
}

impl MessageRow {
    fn into_record(self, id: &str) -> DbResult<TurnRecord> {
        let kind = RecordKind::parse(&self.kind).ok_or_else(|| DbError::Corrupt {
            id: id.to_string(),
            detail: format!("unknown record kind '{}'", self.kind),
        })?;
        let agent = self.agent.as_deref().map(|a| parse_role(id, a)).transpose()?;
        let action = self
            .action
            .as_deref()
            .map(serde_json::from_str::<ActionPayload>)
            .transpose()?;
        Ok(TurnRecord {
            kind,
            content: self.content,
            agent,
            action,
        })
    }
}

/// Stored records of one conversation in sequence order
fn load_messages(conn: &Connection, id: &str) -> DbResult<Vec<TurnRecord>> {
    let mut stmt = conn.prepare(
        "SELECT kind, content, agent, action FROM messages
         WHERE conversation_id = ?1 ORDER BY sequence_id ASC",
    )?;
    let rows = stmt.query_map(params![id], |row| {
        Ok(MessageRow {
            kind: row.get(0)?,
            content: row.get(1)?,
            agent: row.get(2)?,
            action: row.get(3)?,
        })
    })?;

    let mut messages = Vec::new();
    for message in rows {
        messages.push(message?.into_record(id)?);
    }
    Ok(messages)
}

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Load the full state of a conversation, `None` if it was never saved
    pub fn load_conversation(&self, id: &str) -> DbResult<Option<ConversationState>> {
        let conn = self.conn.lock().unwrap();

        let row = conn
            .query_row(
                "SELECT active_role, handoff_summary, handoff_from, terminated, end_reason
                 FROM conversations WHERE id = ?1",
                params![id],
                |row| {
                    Ok(ConversationRow {
                        active_role: row.get(0)?,
                        handoff_summary: row.get(1)?,
                        handoff_from: row.get(2)?,
                        terminated: row.get(3)?,
                        end_reason: row.get(4)?,
                    })
                },
            )
            .optional()?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(ConversationState {
            messages: load_messages(&conn, id)?,
            active_role: parse_role(id, &row.active_role)?,
            handoff_summary: row.handoff_summary,
            handoff_from: row
                .handoff_from
                .as_deref()
                .map(|r| parse_role(id, r))
                .transpose()?,
            terminated: row.terminated,
            end_reason: row.end_reason,
        }))
    }

    /// Persist `state` in one transaction.
    ///
    /// The stored messages must be a prefix of `state.messages`; only the
    /// records past them are inserted. A state that drops or alters stored
    /// records, or a live state over a terminated one, is refused.
    pub fn save_conversation(&self, id: &str, state: &ConversationState) -> DbResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        let stored_terminated: Option<bool> = tx
            .query_row(
                "SELECT terminated FROM conversations WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        if stored_terminated == Some(true) && !state.terminated {
            return Err(DbError::Reopen(id.to_string()));
        }

        let stored = load_messages(&tx, id)?;
        if !state.messages.starts_with(&stored) {
            return Err(DbError::HistoryRewrite {
                id: id.to_string(),
                stored: stored.len(),
                given: state.messages.len(),
            });
        }
        let stored = stored.len();

        tx.execute(
            "INSERT INTO conversations
                (id, active_role, handoff_summary, handoff_from, terminated, end_reason, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(id) DO UPDATE SET
                active_role = excluded.active_role,
                handoff_summary = excluded.handoff_summary,
                handoff_from = excluded.handoff_from,
                terminated = excluded.terminated,
                end_reason = excluded.end_reason,
                updated_at = excluded.updated_at",
            params![
                id,
                state.active_role.id(),
                state.handoff_summary,
                state.handoff_from.map(Role::id),
                state.terminated,
                state.end_reason,
                now,
            ],
        )?;

        for (sequence_id, record) in state.messages.iter().enumerate().skip(stored) {
            let action = record.action.as_ref().map(serde_json::to_string).transpose()?;
            tx.execute(
                "INSERT INTO messages (conversation_id, sequence_id, kind, content, agent, action, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    sequence_id,
                    record.kind.as_str(),
                    record.content,
                    record.agent.map(Role::id),
                    action,
                    now,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Summary of one conversation
    pub fn get_summary(&self, id: &str) -> DbResult<ConversationSummary> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(&format!("{SUMMARY_SELECT} WHERE c.id = ?1"), params![id], summary_row)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => DbError::ConversationNotFound(id.to_string()),
                other => DbError::Sqlite(other),
            })?
            .into_summary()
    }

    /// All conversations, most recently updated first
    pub fn list_conversations(&self) -> DbResult<Vec<ConversationSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("{SUMMARY_SELECT} ORDER BY c.updated_at DESC"))?;
        let rows = stmt.query_map([], summary_row)?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?.into_summary()?);
        }
        Ok(summaries)
    }
}

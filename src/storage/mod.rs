//! Storage layer for workflow session persistence.
//!
//! A session is stored as a JSON snapshot of its [`WorkflowStateMachine`],
//! alongside the columns needed to list sessions without decoding them.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::workflow::{Stage, WorkflowStateMachine};

/// A persisted workflow session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSession {
    /// Unique session identifier.
    pub id: String,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was last saved.
    pub updated_at: DateTime<Utc>,
    /// Full workflow state.
    pub state: WorkflowStateMachine,
}

/// Listing entry for a session, without its state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub stage: Stage,
    pub hypotheses: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowSession {
    /// Create a new session at the upload stage
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            state: WorkflowStateMachine::new(),
        }
    }

    /// Mark the session as modified now
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for WorkflowSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Storage trait for session persistence
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert or replace a session snapshot
    async fn save_session(&self, session: &WorkflowSession) -> StorageResult<()>;

    /// Load a session by id
    async fn load_session(&self, id: &str) -> StorageResult<Option<WorkflowSession>>;

    /// List sessions, most recently updated first
    async fn list_sessions(&self) -> StorageResult<Vec<SessionSummary>>;

    /// Delete a session. Returns `true` if it existed.
    async fn delete_session(&self, id: &str) -> StorageResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_defaults() {
        let session = WorkflowSession::new();
        assert_eq!(session.state.stage(), Stage::Upload);
        assert_eq!(session.created_at, session.updated_at);
        assert!(Uuid::parse_str(&session.id).is_ok());
    }

    #[test]
    fn test_touch_advances_updated_at() {
        let mut session = WorkflowSession::new();
        let before = session.updated_at;
        session.touch();
        assert!(session.updated_at >= before);
        assert_eq!(session.created_at, before);
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(WorkflowSession::new().id, WorkflowSession::new().id);
    }
}

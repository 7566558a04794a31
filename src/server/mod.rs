//! Server module for the rendering-layer surface.
//!
//! This module provides:
//! - A JSON-RPC 2.0 server over stdio
//! - Method handlers that drive the workflow for one session per call
//! - Shared application state

mod handlers;
mod rpc;

pub use handlers::*;
pub use rpc::*;

use std::sync::Arc;

use tracing::debug;

use crate::assistant::{AssistantCall, AssistantClient};
use crate::config::Config;
use crate::error::{AppResult, RpcError};
use crate::orchestrator::StageOrchestrator;
use crate::storage::{SqliteStorage, Storage, WorkflowSession};
use crate::transcript::{DirImageStore, ImageStore};

/// Application state shared across handlers.
///
/// Sessions live in storage; every handler loads the session it works on
/// and saves it again after a mutation.
pub struct AppState<A = AssistantClient, S = DirImageStore> {
    /// Application configuration.
    pub config: Config,
    /// SQLite storage backend.
    pub storage: SqliteStorage,
    /// Stage orchestrator bound to the assistant and image store.
    pub orchestrator: StageOrchestrator<A, S>,
}

impl<A, S> AppState<A, S>
where
    A: AssistantCall,
    S: ImageStore,
{
    /// Create new application state
    pub fn new(config: Config, storage: SqliteStorage, orchestrator: StageOrchestrator<A, S>) -> Self {
        Self {
            config,
            storage,
            orchestrator,
        }
    }

    /// Load a session, failing if it does not exist.
    pub async fn load(&self, session_id: &str) -> AppResult<WorkflowSession> {
        self.storage
            .load_session(session_id)
            .await?
            .ok_or_else(|| {
                RpcError::UnknownSession {
                    session_id: session_id.to_string(),
                }
                .into()
            })
    }

    /// Stamp and persist a session after a mutation.
    pub async fn persist(&self, session: &mut WorkflowSession) -> AppResult<()> {
        session.touch();
        self.storage.save_session(session).await?;
        debug!(session_id = %session.id, stage = %session.state.stage(), "Session persisted");
        Ok(())
    }
}

impl AppState {
    /// Build the production state: HTTP assistant client and on-disk images.
    pub fn from_config(config: Config, storage: SqliteStorage) -> AppResult<Self> {
        let assistant = AssistantClient::new(&config.assistant, config.request.clone())?;
        let images = DirImageStore::new(&config.images)?;
        let orchestrator = StageOrchestrator::new(assistant, images, config.models.clone());
        Ok(Self::new(config, storage, orchestrator))
    }
}

/// Shared application state handle
pub type SharedState<A = AssistantClient, S = DirImageStore> = Arc<AppState<A, S>>;

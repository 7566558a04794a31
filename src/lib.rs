//! # Research Workflow
//!
//! A workflow engine that takes uploaded data files and free-text hypotheses
//! through an assistant-driven research process: data summary, hypothesis
//! refinement, analysis planning, streamed code execution and a final report.
//!
//! ## Stages
//!
//! - **Upload**: data file ids plus the hypotheses text
//! - **Processing**: a schema-constrained summary of every column
//! - **Hypothesis review**: refine, discuss and accept each hypothesis
//! - **Plan review**: draft and accept a structured analysis plan per hypothesis
//! - **Execution**: run the plan with a code interpreter, keep the transcript
//! - **Report**: one report across every executed hypothesis
//!
//! Entering a stage is gated on every hypothesis having cleared the stages
//! before it.
//!
//! ## Architecture
//!
//! ```text
//! Rendering layer → JSON-RPC (stdio) → StageOrchestrator → Assistant API (HTTP)
//!                                              ↓
//!                                  WorkflowStateMachine → SQLite (sessions)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use research_workflow::{AppState, Config, WorkflowServer};
//! use research_workflow::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let state = Arc::new(AppState::from_config(config, storage)?);
//!     WorkflowServer::new(state).run().await?;
//!     Ok(())
//! }
//! ```

/// Assistant API client, request types and response schemas.
pub mod assistant;
/// Command-line interface.
pub mod cli;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Stage orchestration over the assistant and the state machine.
pub mod orchestrator;
/// Analysis plan parsing.
pub mod plan;
/// System prompts for each workflow stage.
pub mod prompts;
/// JSON-RPC server and request handling.
pub mod server;
/// SQLite storage layer for persistence.
pub mod storage;
/// Stream event aggregation into transcript segments.
pub mod transcript;
/// Workflow state machine and hypothesis records.
pub mod workflow;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use orchestrator::StageOrchestrator;
pub use server::{AppState, SharedState, WorkflowServer};
pub use workflow::{Stage, WorkflowStateMachine};

//! Command-line interface.
//!
//! `serve` (the default) runs the JSON-RPC server on stdio; `sessions`
//! inspects and prunes persisted sessions without starting it.

use clap::{Parser, Subcommand};

use crate::storage::{Storage, WorkflowSession};
use crate::workflow::{ExecutionStatus, HypothesisStatus, PlanStatus};

/// Research workflow server.
#[derive(Parser, Debug)]
#[command(name = "research-workflow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Top-level commands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Run the JSON-RPC server over stdio
    Serve,

    /// Inspect persisted sessions
    #[command(subcommand)]
    Sessions(SessionCommands),
}

/// Session subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum SessionCommands {
    /// List sessions, most recently updated first
    List,

    /// Show a session's stage and per-hypothesis progress
    Show {
        /// Session id
        id: String,
    },

    /// Delete a session
    Delete {
        /// Session id
        id: String,
    },
}

impl Cli {
    /// Command to run, `serve` when none was given.
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}

/// Result of CLI command execution.
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Execute a session subcommand against storage.
pub async fn execute_session_command<S: Storage>(command: SessionCommands, storage: &S) -> CliResult {
    match command {
        SessionCommands::List => execute_list(storage).await,
        SessionCommands::Show { id } => execute_show(storage, &id).await,
        SessionCommands::Delete { id } => execute_delete(storage, &id).await,
    }
}

async fn execute_list<S: Storage>(storage: &S) -> CliResult {
    let sessions = match storage.list_sessions().await {
        Ok(s) => s,
        Err(e) => return CliResult::error(format!("Failed to list sessions: {}", e)),
    };

    if sessions.is_empty() {
        return CliResult::success("No sessions.");
    }

    let mut output = format!("{:<36}  {:<17}  {:>10}  {}\n", "ID", "STAGE", "HYPOTHESES", "UPDATED");
    for session in sessions {
        output.push_str(&format!(
            "{:<36}  {:<17}  {:>10}  {}\n",
            session.id,
            session.stage.to_string(),
            session.hypotheses,
            session.updated_at.format("%Y-%m-%d %H:%M:%S")
        ));
    }
    CliResult::success(output)
}

async fn execute_show<S: Storage>(storage: &S, id: &str) -> CliResult {
    match storage.load_session(id).await {
        Ok(Some(session)) => CliResult::success(describe_session(&session)),
        Ok(None) => CliResult::error(format!("Session not found: {}", id)),
        Err(e) => CliResult::error(format!("Failed to load session: {}", e)),
    }
}

async fn execute_delete<S: Storage>(storage: &S, id: &str) -> CliResult {
    match storage.delete_session(id).await {
        Ok(true) => CliResult::success(format!("Deleted session {}", id)),
        Ok(false) => CliResult::error(format!("Session not found: {}", id)),
        Err(e) => CliResult::error(format!("Failed to delete session: {}", e)),
    }
}

fn describe_session(session: &WorkflowSession) -> String {
    let state = &session.state;
    let mut output = format!(
        "Session {}\nStage: {}\nCreated: {}\nUpdated: {}\n",
        session.id,
        state.stage(),
        session.created_at.to_rfc3339(),
        session.updated_at.to_rfc3339()
    );

    if let Some(upload) = state.upload() {
        output.push_str(&format!("Data files: {}\n", upload.data_files.len()));
    }
    if state.report().is_some() {
        output.push_str("Report: generated\n");
    }

    for record in state.records() {
        output.push_str(&format!(
            "\n[{}] {}\n    hypothesis: {}  plan: {}  execution: {}\n",
            record.id(),
            record.title(),
            hypothesis_label(record.hypothesis_status()),
            plan_label(record.plan_status()),
            execution_label(record.execution_status()),
        ));
    }
    output
}

fn hypothesis_label(status: HypothesisStatus) -> &'static str {
    match status {
        HypothesisStatus::Drafted => "drafted",
        HypothesisStatus::Discussing => "discussing",
        HypothesisStatus::Accepted => "accepted",
    }
}

fn plan_label(status: PlanStatus) -> &'static str {
    match status {
        PlanStatus::NoPlan => "none",
        PlanStatus::DraftingPlan => "drafting",
        PlanStatus::PlanAccepted => "accepted",
    }
}

fn execution_label(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::NotRun => "not run",
        ExecutionStatus::Ran => "ran",
        ExecutionStatus::ExecutionAccepted => "accepted",
    }
}

//! Per-hypothesis workflow state.
//!
//! [`WorkflowStateMachine`] owns the hypothesis records and the session-level
//! artifacts (upload, data summary, report). All writes go through its
//! transition operations; derived gates are recomputed on every query.

mod machine;
mod record;
mod session;

pub use machine::WorkflowStateMachine;
pub use record::{
    ChatMessage, ExecutionRun, ExecutionStatus, HypothesisRecord, HypothesisStatus, PlanStatus,
};
pub use session::{ColumnSummary, DataFile, DatasetSummary, RefinedHypothesis, ReportTurn, Upload};

use serde::{Deserialize, Serialize};

/// Workflow stage, in navigation order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Data files and hypotheses are being uploaded.
    #[default]
    Upload,
    /// Dataset summary and hypothesis refinement.
    Processing,
    /// Per-hypothesis discussion and acceptance.
    HypothesisReview,
    /// Per-hypothesis analysis planning.
    PlanReview,
    /// Running the accepted plans.
    Execution,
    /// Final report generation and refinement.
    Report,
}

impl Stage {
    /// All stages in navigation order.
    pub const ALL: [Stage; 6] = [
        Stage::Upload,
        Stage::Processing,
        Stage::HypothesisReview,
        Stage::PlanReview,
        Stage::Execution,
        Stage::Report,
    ];
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Upload => write!(f, "upload"),
            Stage::Processing => write!(f, "processing"),
            Stage::HypothesisReview => write!(f, "hypothesis_review"),
            Stage::PlanReview => write!(f, "plan_review"),
            Stage::Execution => write!(f, "execution"),
            Stage::Report => write!(f, "report"),
        }
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "upload" => Ok(Stage::Upload),
            "processing" => Ok(Stage::Processing),
            "hypothesis_review" => Ok(Stage::HypothesisReview),
            "plan_review" => Ok(Stage::PlanReview),
            "execution" => Ok(Stage::Execution),
            "report" => Ok(Stage::Report),
            _ => Err(format!("Unknown stage: {}", s)),
        }
    }
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

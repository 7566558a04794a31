use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::record::{ExecutionStatus, HypothesisRecord, HypothesisStatus};
use super::session::{DatasetSummary, RefinedHypothesis, ReportTurn, Upload};
use super::Stage;
use crate::error::{WorkflowError, WorkflowResult};
use crate::transcript::Segment;

/// Session-level workflow state.
///
/// Owns the hypothesis records exclusively. The gates
/// (`all_hypotheses_accepted`, `all_plans_ready`, `all_executed`) are never
/// stored; they are folded over the records each time they are asked for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStateMachine {
    #[serde(default)]
    stage: Stage,
    #[serde(default)]
    records: Vec<HypothesisRecord>,
    #[serde(default)]
    upload: Option<Upload>,
    #[serde(default)]
    data_summary: Option<DatasetSummary>,
    #[serde(default)]
    report: Option<String>,
    #[serde(default)]
    report_chat: Vec<ReportTurn>,
}

impl WorkflowStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn records(&self) -> &[HypothesisRecord] {
        &self.records
    }

    pub fn record(&self, id: usize) -> WorkflowResult<&HypothesisRecord> {
        self.records
            .get(id)
            .ok_or(WorkflowError::RecordNotFound { id })
    }

    fn record_mut(&mut self, id: usize) -> WorkflowResult<&mut HypothesisRecord> {
        self.records
            .get_mut(id)
            .ok_or(WorkflowError::RecordNotFound { id })
    }

    pub fn upload(&self) -> Option<&Upload> {
        self.upload.as_ref()
    }

    pub fn data_summary(&self) -> Option<&DatasetSummary> {
        self.data_summary.as_ref()
    }

    pub fn report(&self) -> Option<&str> {
        self.report.as_deref()
    }

    pub fn report_chat(&self) -> &[ReportTurn] {
        &self.report_chat
    }

    pub fn all_hypotheses_accepted(&self) -> bool {
        !self.records.is_empty()
            && self
                .records
                .iter()
                .all(|r| r.hypothesis_status() == HypothesisStatus::Accepted)
    }

    pub fn all_plans_ready(&self) -> bool {
        !self.records.is_empty() && self.records.iter().all(HypothesisRecord::plan_accepted)
    }

    pub fn all_executed(&self) -> bool {
        !self.records.is_empty()
            && self
                .records
                .iter()
                .all(|r| r.execution_status() == ExecutionStatus::ExecutionAccepted)
    }

    fn first_pending(
        &self,
        pending: impl Fn(&HypothesisRecord) -> bool,
        what: &str,
    ) -> Option<String> {
        self.records
            .iter()
            .find(|r| pending(r))
            .map(|r| format!("{}hypothesis {} is not accepted", what, r.id()))
    }

    /// First unmet precondition for entering `stage` itself, ignoring the
    /// stages before it.
    fn stage_precondition(&self, stage: Stage) -> Option<String> {
        match stage {
            Stage::Upload => None,
            Stage::Processing => self
                .upload
                .is_none()
                .then(|| "no data has been uploaded".to_string()),
            Stage::HypothesisReview => self
                .records
                .is_empty()
                .then(|| "no hypotheses have been refined".to_string()),
            Stage::PlanReview => {
                self.first_pending(|r| r.hypothesis_status() != HypothesisStatus::Accepted, "")
            }
            Stage::Execution => self.first_pending(|r| !r.plan_accepted(), "plan for "),
            Stage::Report => self.first_pending(|r| !r.execution_accepted(), "execution for "),
        }
    }

    /// Check every gate up to and including `target`.
    pub fn check_gate(&self, target: Stage) -> WorkflowResult<()> {
        for stage in Stage::ALL.into_iter().filter(|s| *s <= target) {
            if let Some(unmet) = self.stage_precondition(stage) {
                return Err(WorkflowError::GatingViolation { target, unmet });
            }
        }
        Ok(())
    }

    pub fn can_enter(&self, target: Stage) -> bool {
        self.check_gate(target).is_ok()
    }

    /// Move to `target`. Backward (and same-stage) navigation is always
    /// allowed; forward navigation re-evaluates every gate on the way.
    pub fn navigate(&mut self, target: Stage) -> WorkflowResult<Stage> {
        if target > self.stage {
            self.check_gate(target)?;
        }
        debug!(from = %self.stage, to = %target, "Stage change");
        self.stage = target;
        Ok(target)
    }

    /// Discard everything and return to the upload stage.
    pub fn reset(&mut self) {
        info!(records = self.records.len(), "Workflow reset");
        *self = Self::default();
    }

    pub fn record_upload(&mut self, upload: Upload) -> WorkflowResult<()> {
        if upload.data_files.is_empty() {
            return Err(precondition("at least one data file is required"));
        }
        if upload.hypotheses_text.trim().is_empty() {
            return Err(precondition("hypotheses text is empty"));
        }
        if !self.records.is_empty() {
            return Err(precondition(
                "hypotheses were already refined; reset the session to upload new data",
            ));
        }
        self.upload = Some(upload);
        Ok(())
    }

    pub fn set_data_summary(&mut self, summary: DatasetSummary) -> WorkflowResult<()> {
        if self.upload.is_none() {
            return Err(precondition("no data has been uploaded"));
        }
        self.data_summary = Some(summary);
        Ok(())
    }

    /// Edit one column of the data summary. `None` leaves a field unchanged.
    pub fn update_column(
        &mut self,
        column_name: &str,
        description: Option<String>,
        column_type: Option<String>,
    ) -> WorkflowResult<()> {
        let summary = self
            .data_summary
            .as_mut()
            .ok_or_else(|| precondition("no data summary exists"))?;
        let column = summary
            .column_mut(column_name)
            .ok_or_else(|| precondition(format!("unknown column: {}", column_name)))?;
        if let Some(description) = description {
            column.description = description;
        }
        if let Some(column_type) = column_type {
            column.column_type = column_type;
        }
        Ok(())
    }

    /// Create all records at once from the refinement result. Records are
    /// created exactly once per session.
    pub fn install_records<I>(&mut self, refined: I) -> WorkflowResult<usize>
    where
        I: IntoIterator<Item = RefinedHypothesis>,
    {
        if !self.records.is_empty() {
            return Err(precondition("hypotheses have already been refined"));
        }
        let records: Vec<HypothesisRecord> = refined
            .into_iter()
            .enumerate()
            .map(|(id, hypothesis)| HypothesisRecord::seeded(id, hypothesis))
            .collect();
        if records.is_empty() {
            return Err(precondition("refinement produced no hypotheses"));
        }
        self.records = records;
        Ok(self.records.len())
    }

    /// Commit a user message and the assistant's reply together. Returns
    /// `true` if the hypothesis was accepted and is now reopened.
    pub fn discuss_hypothesis(
        &mut self,
        id: usize,
        user: impl Into<String>,
        reply: impl Into<String>,
        refined_text: Option<String>,
    ) -> WorkflowResult<bool> {
        let record = self.record_mut(id)?;
        let reopened = record.discuss(user.into(), reply.into(), refined_text);
        if reopened {
            info!(hypothesis = id, "Accepted hypothesis reopened");
        }
        Ok(reopened)
    }

    pub fn accept_hypothesis(&mut self, id: usize) -> WorkflowResult<()> {
        self.record_mut(id)?.accept()
    }

    pub fn append_plan_turn(
        &mut self,
        id: usize,
        user: Option<String>,
        reply: impl Into<String>,
    ) -> WorkflowResult<()> {
        self.record_mut(id)?.append_plan_turn(user, reply.into())
    }

    pub fn accept_plan(&mut self, id: usize) -> WorkflowResult<()> {
        self.record_mut(id)?.accept_plan()
    }

    pub fn edit_plan(&mut self, id: usize) -> WorkflowResult<()> {
        self.record_mut(id)?.edit_plan()
    }

    /// Append one execution run. Returns the number of runs so far.
    pub fn append_execution(
        &mut self,
        id: usize,
        prompt: Option<String>,
        segments: Vec<Segment>,
    ) -> WorkflowResult<usize> {
        self.record_mut(id)?.append_execution(prompt, segments)
    }

    pub fn accept_execution(&mut self, id: usize) -> WorkflowResult<()> {
        self.record_mut(id)?.accept_execution()
    }

    /// Store a freshly generated report. Requires every execution accepted.
    pub fn set_report(&mut self, markdown: impl Into<String>) -> WorkflowResult<()> {
        self.check_gate(Stage::Report)?;
        self.report = Some(markdown.into());
        Ok(())
    }

    pub fn append_report_turn(
        &mut self,
        user: impl Into<String>,
        segments: Vec<Segment>,
    ) -> WorkflowResult<()> {
        if self.report.is_none() {
            return Err(precondition("no report has been generated"));
        }
        self.report_chat.push(ReportTurn::User {
            content: user.into(),
        });
        self.report_chat.push(ReportTurn::Assistant { segments });
        Ok(())
    }
}

fn precondition(message: impl Into<String>) -> WorkflowError {
    WorkflowError::PreconditionUnmet {
        message: message.into(),
    }
}

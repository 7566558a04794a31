use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RefinedHypothesis, Role};
use crate::error::{WorkflowError, WorkflowResult};
use crate::plan::{self, PlanSource, StructuredPlan};
use crate::transcript::Segment;

/// A single chat message. Assistant turns of the hypothesis chat carry the
/// refined hypothesis they proposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refined_text: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            refined_text: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            refined_text: None,
        }
    }

    pub fn with_refined_text(mut self, refined_text: impl Into<String>) -> Self {
        self.refined_text = Some(refined_text.into());
        self
    }
}

/// Audit entry for one execution run: which slice of the flat transcript
/// the run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRun {
    /// User follow-up prompt, `None` for a plan-driven run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub segment_count: usize,
    pub started_at: DateTime<Utc>,
}

/// Hypothesis lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisStatus {
    Drafted,
    Discussing,
    Accepted,
}

/// Plan lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    NoPlan,
    DraftingPlan,
    PlanAccepted,
}

/// Execution lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    NotRun,
    Ran,
    ExecutionAccepted,
}

/// Everything tracked for one hypothesis across the workflow.
///
/// Fields are read through accessors; mutation is reserved for the state
/// machine so the lifecycle invariants hold:
/// - `final_hypothesis` is only set by acceptance,
/// - `plan_accepted` implies `analysis_plan` is structured,
/// - `execution_accepted` implies a non-empty transcript,
/// - the transcript only grows and the run index covers it exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisRecord {
    id: usize,
    title: String,
    refined_text: String,
    #[serde(default)]
    analysis_text: String,
    #[serde(default)]
    chat_history: Vec<ChatMessage>,
    #[serde(default)]
    final_hypothesis: Option<String>,
    #[serde(default)]
    plan_chat_history: Vec<ChatMessage>,
    #[serde(default)]
    analysis_plan: Option<PlanSource>,
    #[serde(default)]
    plan_accepted: bool,
    #[serde(default)]
    execution_transcript: Vec<Segment>,
    #[serde(default)]
    execution_runs: Vec<ExecutionRun>,
    #[serde(default)]
    execution_accepted: bool,
}

impl HypothesisRecord {
    /// A fresh record with an empty discussion.
    pub fn new(id: usize, title: impl Into<String>, refined_text: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            refined_text: refined_text.into(),
            analysis_text: String::new(),
            chat_history: Vec::new(),
            final_hypothesis: None,
            plan_chat_history: Vec::new(),
            analysis_plan: None,
            plan_accepted: false,
            execution_transcript: Vec::new(),
            execution_runs: Vec::new(),
            execution_accepted: false,
        }
    }

    /// A record whose discussion opens with the refinement result, so it can
    /// be accepted as-is.
    pub fn seeded(id: usize, refined: RefinedHypothesis) -> Self {
        let mut record = Self::new(id, refined.title, refined.refined_hypothesis_text);
        record.analysis_text = refined.hypothesis_refined_with_data_text;
        let body = if record.analysis_text.is_empty() {
            &record.refined_text
        } else {
            &record.analysis_text
        };
        let opening = format!("**Refined hypothesis:** {}\n\n{}", record.title, body);
        record
            .chat_history
            .push(ChatMessage::assistant(opening).with_refined_text(record.refined_text.clone()));
        record
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn refined_text(&self) -> &str {
        &self.refined_text
    }

    /// Extended critique produced by bulk refinement.
    pub fn analysis_text(&self) -> &str {
        &self.analysis_text
    }

    pub fn chat_history(&self) -> &[ChatMessage] {
        &self.chat_history
    }

    pub fn final_hypothesis(&self) -> Option<&str> {
        self.final_hypothesis.as_deref()
    }

    pub fn plan_chat_history(&self) -> &[ChatMessage] {
        &self.plan_chat_history
    }

    pub fn analysis_plan(&self) -> Option<&PlanSource> {
        self.analysis_plan.as_ref()
    }

    /// The accepted structured plan, if any.
    pub fn accepted_plan(&self) -> Option<&StructuredPlan> {
        match (&self.analysis_plan, self.plan_accepted) {
            (Some(PlanSource::Structured(plan)), true) => Some(plan),
            _ => None,
        }
    }

    pub fn plan_accepted(&self) -> bool {
        self.plan_accepted
    }

    pub fn execution_transcript(&self) -> &[Segment] {
        &self.execution_transcript
    }

    pub fn execution_runs(&self) -> &[ExecutionRun] {
        &self.execution_runs
    }

    /// Segments produced by run `index`.
    pub fn run_segments(&self, index: usize) -> Option<&[Segment]> {
        let run = self.execution_runs.get(index)?;
        let start: usize = self.execution_runs[..index]
            .iter()
            .map(|r| r.segment_count)
            .sum();
        self.execution_transcript
            .get(start..start + run.segment_count)
    }

    pub fn execution_accepted(&self) -> bool {
        self.execution_accepted
    }

    pub fn hypothesis_status(&self) -> HypothesisStatus {
        if self.final_hypothesis.is_some() {
            HypothesisStatus::Accepted
        } else if self.chat_history.is_empty() {
            HypothesisStatus::Drafted
        } else {
            HypothesisStatus::Discussing
        }
    }

    pub fn plan_status(&self) -> PlanStatus {
        if self.plan_accepted {
            PlanStatus::PlanAccepted
        } else if self.plan_chat_history.is_empty() && self.analysis_plan.is_none() {
            PlanStatus::NoPlan
        } else {
            PlanStatus::DraftingPlan
        }
    }

    pub fn execution_status(&self) -> ExecutionStatus {
        if self.execution_accepted {
            ExecutionStatus::ExecutionAccepted
        } else if self.execution_transcript.is_empty() {
            ExecutionStatus::NotRun
        } else {
            ExecutionStatus::Ran
        }
    }

    fn invalid(&self, message: impl Into<String>) -> WorkflowError {
        WorkflowError::InvalidTransition {
            id: self.id,
            message: message.into(),
        }
    }

    /// Commit one discussion turn. Returns `true` when the turn reopened an
    /// accepted hypothesis.
    pub(super) fn discuss(
        &mut self,
        user: String,
        reply: String,
        refined_text: Option<String>,
    ) -> bool {
        let mut assistant = ChatMessage::assistant(reply);
        if let Some(text) = refined_text {
            self.refined_text = text.clone();
            assistant = assistant.with_refined_text(text);
        }
        self.chat_history.push(ChatMessage::user(user));
        self.chat_history.push(assistant);
        self.final_hypothesis.take().is_some()
    }

    pub(super) fn accept(&mut self) -> WorkflowResult<()> {
        match self.hypothesis_status() {
            HypothesisStatus::Drafted => {
                return Err(self.invalid("there is no discussion to accept"));
            }
            HypothesisStatus::Accepted => {
                return Err(self.invalid("hypothesis is already accepted"));
            }
            HypothesisStatus::Discussing => {}
        }
        let text = self
            .chat_history
            .last()
            .and_then(|m| m.refined_text.clone())
            .unwrap_or_else(|| self.refined_text.clone());
        self.final_hypothesis = Some(text);
        Ok(())
    }

    pub(super) fn append_plan_turn(&mut self, user: Option<String>, reply: String) -> WorkflowResult<()> {
        if self.final_hypothesis.is_none() {
            return Err(self.invalid("hypothesis is not accepted"));
        }
        if self.plan_accepted {
            return Err(self.invalid("plan is accepted; edit it before discussing"));
        }
        if let Some(user) = user {
            self.plan_chat_history.push(ChatMessage::user(user));
        }
        self.analysis_plan = Some(PlanSource::Raw(reply.clone()));
        self.plan_chat_history.push(ChatMessage::assistant(reply));
        Ok(())
    }

    pub(super) fn accept_plan(&mut self) -> WorkflowResult<()> {
        if self.plan_accepted {
            return Err(self.invalid("plan is already accepted"));
        }
        let latest = self
            .plan_chat_history
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| PlanSource::Raw(m.content.clone()));
        let source = latest
            .or_else(|| self.analysis_plan.clone())
            .ok_or_else(|| self.invalid("there is no plan to accept"))?;
        let plan = plan::parse(Some(&source))
            .map_err(|e| self.invalid(format!("plan could not be parsed: {}", e)))?;
        self.analysis_plan = Some(PlanSource::Structured(plan));
        self.plan_accepted = true;
        Ok(())
    }

    pub(super) fn edit_plan(&mut self) -> WorkflowResult<()> {
        if !self.plan_accepted {
            return Err(self.invalid("plan is not accepted"));
        }
        self.plan_accepted = false;
        Ok(())
    }

    pub(super) fn append_execution(
        &mut self,
        prompt: Option<String>,
        segments: Vec<Segment>,
    ) -> WorkflowResult<usize> {
        if !self.plan_accepted {
            return Err(self.invalid("plan is not accepted"));
        }
        self.execution_runs.push(ExecutionRun {
            prompt,
            segment_count: segments.len(),
            started_at: Utc::now(),
        });
        self.execution_transcript.extend(segments);
        Ok(self.execution_runs.len())
    }

    pub(super) fn accept_execution(&mut self) -> WorkflowResult<()> {
        if self.execution_transcript.is_empty() {
            return Err(self.invalid("there is no execution output to accept"));
        }
        self.execution_accepted = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(content: &str) -> Segment {
        Segment::Text {
            content: content.to_string(),
        }
    }

    fn refined(title: &str, short: &str, long: &str) -> RefinedHypothesis {
        RefinedHypothesis {
            title: title.to_string(),
            hypothesis_refined_with_data_text: long.to_string(),
            refined_hypothesis_text: short.to_string(),
        }
    }

    fn accepted() -> HypothesisRecord {
        let mut record = HypothesisRecord::seeded(0, refined("Sleep", "Sleep improves recall", ""));
        record.accept().unwrap();
        record
    }

    #[test]
    fn test_new_record_is_drafted() {
        let record = HypothesisRecord::new(0, "T", "text");
        assert_eq!(record.hypothesis_status(), HypothesisStatus::Drafted);
        assert_eq!(record.plan_status(), PlanStatus::NoPlan);
        assert_eq!(record.execution_status(), ExecutionStatus::NotRun);
        assert!(record.clone().accept().is_err());
    }

    #[test]
    fn test_seeded_record_opens_discussion() {
        let record = HypothesisRecord::seeded(
            3,
            refined("Sleep", "Sleep improves recall", "Recall scores rise with sleep hours"),
        );
        assert_eq!(record.hypothesis_status(), HypothesisStatus::Discussing);
        let opening = &record.chat_history()[0];
        assert_eq!(opening.role, Role::Assistant);
        assert_eq!(
            opening.content,
            "**Refined hypothesis:** Sleep\n\nRecall scores rise with sleep hours"
        );
        assert_eq!(opening.refined_text.as_deref(), Some("Sleep improves recall"));
    }

    #[test]
    fn test_accept_uses_latest_refined_text() {
        let mut record = HypothesisRecord::seeded(0, refined("Sleep", "v1", ""));
        record.discuss("tighten it".into(), "Here you go".into(), Some("v2".into()));
        record.accept().unwrap();
        assert_eq!(record.final_hypothesis(), Some("v2"));
        assert_eq!(record.refined_text(), "v2");
    }

    #[test]
    fn test_accept_falls_back_to_record_refined_text() {
        let mut record = HypothesisRecord::seeded(0, refined("Sleep", "v1", ""));
        record.discuss("why?".into(), "Because".into(), None);
        record.accept().unwrap();
        assert_eq!(record.final_hypothesis(), Some("v1"));
    }

    #[test]
    fn test_discuss_reopens_only_accepted() {
        let mut record = accepted();
        assert!(record.discuss("more".into(), "ok".into(), None));
        assert_eq!(record.final_hypothesis(), None);
        assert_eq!(record.hypothesis_status(), HypothesisStatus::Discussing);
        assert!(!record.discuss("again".into(), "ok".into(), None));
    }

    #[test]
    fn test_plan_requires_accepted_hypothesis() {
        let mut record = HypothesisRecord::seeded(0, refined("T", "x", ""));
        let err = record.append_plan_turn(None, "plan".into()).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { id: 0, .. }));
    }

    #[test]
    fn test_accept_plan_parses_latest_assistant_message() {
        let mut record = accepted();
        record
            .append_plan_turn(None, "1. Load data\n2. Fit model".into())
            .unwrap();
        assert_eq!(record.plan_status(), PlanStatus::DraftingPlan);
        record.accept_plan().unwrap();

        let plan = record.accepted_plan().unwrap();
        let analyses = plan.analyses().unwrap();
        assert_eq!(analyses[0].title, "Analysis Plan");
        assert_eq!(analyses[0].steps.len(), 2);
        assert_eq!(record.plan_status(), PlanStatus::PlanAccepted);
    }

    #[test]
    fn test_discussing_accepted_plan_is_rejected_until_edit() {
        let mut record = accepted();
        record.append_plan_turn(None, "{\"a\": 1}".into()).unwrap();
        record.accept_plan().unwrap();
        assert!(record.append_plan_turn(Some("change".into()), "x".into()).is_err());

        record.edit_plan().unwrap();
        assert_eq!(record.plan_status(), PlanStatus::DraftingPlan);
        assert!(matches!(
            record.analysis_plan(),
            Some(PlanSource::Structured(_))
        ));
        record
            .append_plan_turn(Some("change".into()), "{\"a\": 2}".into())
            .unwrap();
    }

    #[test]
    fn test_accept_plan_without_plan_fails() {
        let mut record = accepted();
        assert!(record.accept_plan().is_err());
        assert!(!record.plan_accepted());
    }

    #[test]
    fn test_execution_appends_and_indexes_runs() {
        let mut record = accepted();
        record.append_plan_turn(None, "- step".into()).unwrap();
        record.accept_plan().unwrap();

        assert!(record.accept_execution().is_err());
        record
            .append_execution(None, vec![text("a"), text("b")])
            .unwrap();
        record.accept_execution().unwrap();
        let runs = record
            .append_execution(Some("plot it".into()), vec![text("c")])
            .unwrap();

        assert_eq!(runs, 2);
        assert!(record.execution_accepted());
        assert_eq!(record.execution_transcript().len(), 3);
        assert_eq!(record.run_segments(1), Some(&[text("c")][..]));
        assert_eq!(record.execution_runs()[1].prompt.as_deref(), Some("plot it"));
    }

    #[test]
    fn test_execution_requires_accepted_plan() {
        let mut record = accepted();
        assert!(record.append_execution(None, vec![text("a")]).is_err());
        assert!(record.execution_transcript().is_empty());
    }
}

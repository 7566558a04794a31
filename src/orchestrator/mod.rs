//! Stage orchestration.
//!
//! [`StageOrchestrator`] sequences assistant calls for each workflow stage
//! and commits their results to a [`WorkflowStateMachine`]. Every assistant
//! call completes before the machine is touched, so a failed call leaves the
//! session exactly as it was and the operation can simply be retried.

pub mod report;

pub use report::{build_report_prompt, inline_report_images};

use tracing::{info, warn};

use crate::assistant::schemas::{
    self, decode_reply, HypothesisChatReply, PlanReply, RefinementReply,
};
use crate::assistant::{AssistantCall, AssistantRequest, Message, Tool};
use crate::config::ModelConfig;
use crate::error::{AppResult, WorkflowError};
use crate::plan::StructuredPlan;
use crate::prompts;
use crate::transcript::{self, ImageStore, Segment, StepOutput, StreamEvent};
use crate::workflow::{
    DatasetSummary, HypothesisRecord, ReportTurn, Role, Stage, WorkflowStateMachine,
};

/// Drives the workflow stages against an assistant and an image store.
pub struct StageOrchestrator<A, S> {
    assistant: A,
    images: S,
    models: ModelConfig,
}

impl<A, S> StageOrchestrator<A, S>
where
    A: AssistantCall,
    S: ImageStore,
{
    pub fn new(assistant: A, images: S, models: ModelConfig) -> Self {
        Self {
            assistant,
            images,
            models,
        }
    }

    pub fn images(&self) -> &S {
        &self.images
    }

    pub fn models(&self) -> &ModelConfig {
        &self.models
    }

    /// Summarize the uploaded data files with the code interpreter.
    pub async fn process_files(&self, machine: &mut WorkflowStateMachine) -> AppResult<()> {
        machine.check_gate(Stage::Processing)?;
        let file_ids = machine
            .upload()
            .map(|u| u.file_ids())
            .unwrap_or_default();

        let request = AssistantRequest::new(
            &self.models.execution,
            vec![Message::user("Summarize the uploaded dataset.")],
        )
        .with_instructions(prompts::DATA_SUMMARY_PROMPT)
        .with_tool(Tool::CodeInterpreter { file_ids })
        .with_schema(schemas::data_summary_schema());

        let text = self.assistant.call(request).await?.into_text();
        let summary: DatasetSummary = decode_reply(&text)?;

        info!(columns = summary.columns.len(), "Data summary ready");
        machine.set_data_summary(summary)?;
        machine.navigate(Stage::Processing)?;
        Ok(())
    }

    /// Refine all uploaded hypotheses at once and create their records.
    pub async fn refine_hypotheses(&self, machine: &mut WorkflowStateMachine) -> AppResult<usize> {
        if !machine.records().is_empty() {
            return Err(precondition("hypotheses have already been refined"));
        }
        let upload = machine
            .upload()
            .ok_or_else(|| precondition("no data has been uploaded"))?;
        let summary = machine
            .data_summary()
            .ok_or_else(|| precondition("the data summary has not been generated"))?;

        let prompt = format!(
            "Data summary: {}\n\nHypotheses: {}\n\n{}\n",
            serde_json::to_string(summary).unwrap_or_default(),
            upload.hypotheses_text,
            prompts::REFINEMENT_TASK
        );
        let request = AssistantRequest::new(&self.models.refinement, vec![Message::user(prompt)])
            .with_instructions(prompts::REFINEMENT_PROMPT)
            .with_tool(Tool::WebSearch)
            .with_schema(schemas::hypotheses_schema());

        let text = self.assistant.call(request).await?.into_text();
        let reply: RefinementReply = decode_reply(&text)?;

        let count = machine.install_records(reply.assistant_response)?;
        machine.navigate(Stage::HypothesisReview)?;
        info!(hypotheses = count, "Hypotheses refined");
        Ok(count)
    }

    /// One discussion turn on a hypothesis. Returns `true` if the turn
    /// reopened an accepted hypothesis.
    pub async fn discuss_hypothesis(
        &self,
        machine: &mut WorkflowStateMachine,
        id: usize,
        message: &str,
    ) -> AppResult<bool> {
        let record = machine.record(id)?;
        let mut input = vec![Message::user(format!(
            "Data summary: {}\n\nHypothesis: {}\n\n{}",
            summary_json(machine.data_summary()),
            record.title(),
            record.refined_text()
        ))];
        input.extend(record.chat_history().iter().map(|m| match m.role {
            Role::User => Message::user(&m.content),
            Role::Assistant => Message::assistant(&m.content),
        }));
        input.push(Message::user(message));

        let request = AssistantRequest::new(&self.models.refinement, input)
            .with_instructions(prompts::REFINEMENT_CHAT_PROMPT)
            .with_tool(Tool::WebSearch)
            .with_schema(schemas::hypothesis_chat_schema());

        let text = self.assistant.call(request).await?.into_text();
        let reply: HypothesisChatReply = decode_reply(&text)?;

        let reopened = machine.discuss_hypothesis(
            id,
            message,
            reply.assistant_response,
            Some(reply.refined_hypothesis_text),
        )?;
        Ok(reopened)
    }

    pub fn accept_hypothesis(&self, machine: &mut WorkflowStateMachine, id: usize) -> AppResult<()> {
        machine.accept_hypothesis(id)?;
        Ok(())
    }

    /// First (or regenerated) plan for an accepted hypothesis.
    pub async fn generate_plan(&self, machine: &mut WorkflowStateMachine, id: usize) -> AppResult<()> {
        let record = machine.record(id)?;
        let hypothesis = plan_open(record)?;
        let prompt = format!(
            "Data summary: {}\n\nHypothesis: {}",
            summary_json(machine.data_summary()),
            hypothesis
        );

        let request =
            AssistantRequest::new(&self.models.planning, vec![Message::user(prompt.clone())])
                .with_instructions(prompts::PLAN_GENERATION_PROMPT)
                .with_tool(Tool::WebSearch)
                .with_schema(schemas::plan_schema())
                .with_temperature(0.0);

        let text = self.assistant.call(request).await?.into_text();
        // Validate the shape now; the raw text is kept for the plan parser.
        decode_reply::<PlanReply>(&text)?;

        machine.append_plan_turn(id, Some(prompt), text)?;
        info!(hypothesis = id, "Plan generated");
        Ok(())
    }

    /// Follow-up planning turn.
    pub async fn discuss_plan(
        &self,
        machine: &mut WorkflowStateMachine,
        id: usize,
        message: &str,
    ) -> AppResult<()> {
        let record = machine.record(id)?;
        plan_open(record)?;
        let mut input: Vec<Message> = record
            .plan_chat_history()
            .iter()
            .map(|m| match m.role {
                Role::User => Message::user(&m.content),
                Role::Assistant => Message::assistant(&m.content),
            })
            .collect();
        input.push(Message::user(message));

        let request = AssistantRequest::new(&self.models.planning, input)
            .with_instructions(prompts::PLAN_CHAT_PROMPT)
            .with_tool(Tool::WebSearch)
            .with_schema(schemas::plan_schema())
            .with_temperature(0.0);

        let text = self.assistant.call(request).await?.into_text();
        decode_reply::<PlanReply>(&text)?;

        machine.append_plan_turn(id, Some(message.to_string()), text)?;
        Ok(())
    }

    pub fn accept_plan(&self, machine: &mut WorkflowStateMachine, id: usize) -> AppResult<()> {
        machine.accept_plan(id)?;
        Ok(())
    }

    pub fn edit_plan(&self, machine: &mut WorkflowStateMachine, id: usize) -> AppResult<()> {
        machine.edit_plan(id)?;
        Ok(())
    }

    /// Run the accepted plan, or a follow-up `prompt` on it, and append the
    /// aggregated output to the record's transcript. Returns this run's
    /// segments.
    pub async fn run_execution(
        &self,
        machine: &mut WorkflowStateMachine,
        id: usize,
        prompt: Option<String>,
    ) -> AppResult<Vec<Segment>> {
        let record = machine.record(id)?;
        let plan = record.accepted_plan().ok_or_else(|| WorkflowError::InvalidTransition {
            id,
            message: "plan is not accepted".to_string(),
        })?;
        let file_ids = machine
            .upload()
            .map(|u| u.file_ids())
            .unwrap_or_default();

        let input = execution_input(record, plan, prompt.as_deref());
        let instructions = match prompt {
            Some(_) => prompts::EXECUTION_CHAT_PROMPT,
            None => prompts::EXECUTION_PROMPT,
        };
        let request = AssistantRequest::new(&self.models.execution, input)
            .with_instructions(instructions)
            .with_tool(Tool::CodeInterpreter { file_ids })
            .streaming();

        let events = self.assistant.call(request).await?.into_events();
        let events = self.resolve_images(events).await;
        let segments = transcript::aggregate(events, &self.images);

        let runs = machine.append_execution(id, prompt, segments.clone())?;
        info!(hypothesis = id, run = runs, segments = segments.len(), "Execution run recorded");
        Ok(segments)
    }

    pub fn accept_execution(&self, machine: &mut WorkflowStateMachine, id: usize) -> AppResult<()> {
        machine.accept_execution(id)?;
        Ok(())
    }

    /// Generate the report from every record's execution history.
    pub async fn generate_report(&self, machine: &mut WorkflowStateMachine) -> AppResult<String> {
        machine.check_gate(Stage::Report)?;
        let prompt = build_report_prompt(machine.records());

        let request = AssistantRequest::new(&self.models.report, vec![Message::user(prompt)])
            .with_instructions(prompts::REPORT_PROMPT)
            .with_tool(Tool::WebSearch);

        let report = self.assistant.call(request).await?.into_text();

        machine.set_report(report.clone())?;
        machine.navigate(Stage::Report)?;
        info!(length = report.len(), "Report generated");
        Ok(report)
    }

    /// One report refinement turn, streamed and aggregated like execution.
    pub async fn discuss_report(
        &self,
        machine: &mut WorkflowStateMachine,
        message: &str,
    ) -> AppResult<Vec<Segment>> {
        let report = machine
            .report()
            .ok_or_else(|| precondition("no report has been generated"))?;
        let file_ids = machine
            .upload()
            .map(|u| u.file_ids())
            .unwrap_or_default();

        let mut input = vec![
            Message::user(build_report_prompt(machine.records())),
            Message::assistant(report),
        ];
        for turn in machine.report_chat() {
            input.push(match turn {
                ReportTurn::User { content } => Message::user(content),
                ReportTurn::Assistant { segments } => {
                    Message::assistant(transcript::segments_to_prompt_text(segments).join("\n\n"))
                }
            });
        }
        input.push(Message::user(message));

        let request = AssistantRequest::new(&self.models.report, input)
            .with_instructions(prompts::REPORT_CHAT_PROMPT)
            .with_tool(Tool::WebSearch)
            .with_tool(Tool::CodeInterpreter { file_ids })
            .streaming();

        let events = self.assistant.call(request).await?.into_events();
        let events = self.resolve_images(events).await;
        let segments = transcript::aggregate(events, &self.images);

        machine.append_report_turn(message, segments.clone())?;
        Ok(segments)
    }

    /// Report markdown with referenced images inlined from the store.
    pub fn render_report(&self, machine: &WorkflowStateMachine) -> Option<String> {
        machine
            .report()
            .map(|text| inline_report_images(text, &self.images))
    }

    pub fn navigate(&self, machine: &mut WorkflowStateMachine, target: Stage) -> AppResult<Stage> {
        Ok(machine.navigate(target)?)
    }

    pub fn reset(&self, machine: &mut WorkflowStateMachine) {
        machine.reset();
    }

    pub fn update_column(
        &self,
        machine: &mut WorkflowStateMachine,
        column_name: &str,
        description: Option<String>,
        column_type: Option<String>,
    ) -> AppResult<()> {
        machine.update_column(column_name, description, column_type)?;
        Ok(())
    }

    /// Fetch the bytes of image outputs that arrived by reference. A failed
    /// fetch leaves the bytes empty; aggregation turns that into a note.
    async fn resolve_images(&self, mut events: Vec<StreamEvent>) -> Vec<StreamEvent> {
        for event in events.iter_mut() {
            let StreamEvent::StepCompleted { outputs } = event else {
                continue;
            };
            for output in outputs.iter_mut() {
                if let StepOutput::Image { id, bytes: bytes @ None } = output {
                    match self.assistant.fetch_file(id).await {
                        Ok(data) => *bytes = Some(data),
                        Err(e) => warn!(file_id = %id, error = %e, "Image fetch failed"),
                    }
                }
            }
        }
        events
    }
}

fn precondition(message: &str) -> crate::error::AppError {
    WorkflowError::PreconditionUnmet {
        message: message.to_string(),
    }
    .into()
}

fn summary_json(summary: Option<&DatasetSummary>) -> String {
    summary
        .and_then(|s| serde_json::to_string(s).ok())
        .unwrap_or_else(|| "{}".to_string())
}

/// Accepted hypothesis text of a record whose plan can still change.
fn plan_open(record: &HypothesisRecord) -> Result<&str, WorkflowError> {
    let invalid = |message: &str| WorkflowError::InvalidTransition {
        id: record.id(),
        message: message.to_string(),
    };
    let hypothesis = record
        .final_hypothesis()
        .ok_or_else(|| invalid("hypothesis is not accepted"))?;
    if record.plan_accepted() {
        return Err(invalid("plan is accepted; edit it before discussing"));
    }
    Ok(hypothesis)
}

/// Messages for an execution run: the plan, what earlier runs produced
/// (with their images re-attached), then the follow-up prompt if any.
fn execution_input(
    record: &HypothesisRecord,
    plan: &StructuredPlan,
    prompt: Option<&str>,
) -> Vec<Message> {
    let plan_json = serde_json::to_string_pretty(plan).unwrap_or_default();
    let mut input = vec![Message::user(format!("\n\nThe analysis plan:\n{}", plan_json))];

    let previous = record.execution_transcript();
    if !previous.is_empty() {
        input.push(Message::assistant(
            transcript::segments_to_prompt_text(previous).join("\n\n"),
        ));
        let image_ids: Vec<String> = previous
            .iter()
            .filter_map(|s| match s {
                Segment::Image { images, .. } => Some(images.iter().map(|i| i.file_id.clone())),
                _ => None,
            })
            .flatten()
            .collect();
        if !image_ids.is_empty() {
            input.push(Message::user("Figures from earlier runs.").with_images(image_ids));
        }
    }

    if let Some(prompt) = prompt {
        input.push(Message::user(prompt));
    }
    input
}

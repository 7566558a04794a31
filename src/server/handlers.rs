use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::AppState;
use crate::assistant::AssistantCall;
use crate::error::{AppResult, RpcError};
use crate::storage::{Storage, WorkflowSession};
use crate::transcript::ImageStore;
use crate::workflow::{ExecutionStatus, HypothesisStatus, PlanStatus, Stage, Upload};

/// A session as returned to the rendering layer, with the report's images
/// already inlined.
///
/// `gates`, `available_stages` and `record_status` are derived from the
/// records when the view is built and are never read back.
#[derive(Debug, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: WorkflowSession,
    pub rendered_report: Option<String>,
    pub gates: GateView,
    pub available_stages: Vec<Stage>,
    pub record_status: Vec<RecordStatusView>,
}

/// Stage gates as of this response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateView {
    pub all_hypotheses_accepted: bool,
    pub all_plans_ready: bool,
    pub all_executed: bool,
}

/// Lifecycle position of one hypothesis record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordStatusView {
    pub id: usize,
    pub hypothesis_status: HypothesisStatus,
    pub plan_status: PlanStatus,
    pub execution_status: ExecutionStatus,
}

impl SessionView {
    pub fn new(session: WorkflowSession, rendered_report: Option<String>) -> Self {
        let machine = &session.state;
        let gates = GateView {
            all_hypotheses_accepted: machine.all_hypotheses_accepted(),
            all_plans_ready: machine.all_plans_ready(),
            all_executed: machine.all_executed(),
        };
        let available_stages = Stage::ALL
            .into_iter()
            .filter(|stage| machine.can_enter(*stage))
            .collect();
        let record_status = machine
            .records()
            .iter()
            .map(|record| RecordStatusView {
                id: record.id(),
                hypothesis_status: record.hypothesis_status(),
                plan_status: record.plan_status(),
                execution_status: record.execution_status(),
            })
            .collect();

        Self {
            session,
            rendered_report,
            gates,
            available_stages,
            record_status,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionParams {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct NavigateParams {
    session_id: String,
    stage: Stage,
}

#[derive(Debug, Deserialize)]
struct UploadParams {
    session_id: String,
    #[serde(flatten)]
    upload: Upload,
}

#[derive(Debug, Deserialize)]
struct ColumnParams {
    session_id: String,
    column_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    column_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecordParams {
    session_id: String,
    hypothesis_id: usize,
}

#[derive(Debug, Deserialize)]
struct RecordMessageParams {
    session_id: String,
    hypothesis_id: usize,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ExecutionParams {
    session_id: String,
    hypothesis_id: usize,
    #[serde(default)]
    prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageParams {
    session_id: String,
    message: String,
}

/// Route a workflow method to its handler
pub async fn handle_method<A, S>(
    state: &AppState<A, S>,
    method: &str,
    params: Option<Value>,
) -> AppResult<Value>
where
    A: AssistantCall,
    S: ImageStore,
{
    info!(method = %method, "Routing method call");

    match method {
        // Sessions
        "session/create" => handle_session_create(state).await,
        "session/get" => handle_session_get(state, params).await,
        "session/list" => handle_session_list(state).await,
        "session/reset" => handle_session_reset(state, params).await,
        "session/navigate" => handle_session_navigate(state, params).await,
        "session/upload" => handle_session_upload(state, params).await,
        // Data summary
        "summary/process" => handle_summary_process(state, params).await,
        "summary/update_column" => handle_summary_update_column(state, params).await,
        // Hypotheses
        "hypotheses/refine" => handle_hypotheses_refine(state, params).await,
        "hypothesis/discuss" => handle_hypothesis_discuss(state, params).await,
        "hypothesis/accept" => handle_hypothesis_accept(state, params).await,
        // Plans
        "plan/generate" => handle_plan_generate(state, params).await,
        "plan/discuss" => handle_plan_discuss(state, params).await,
        "plan/accept" => handle_plan_accept(state, params).await,
        "plan/edit" => handle_plan_edit(state, params).await,
        // Execution
        "execution/run" => handle_execution_run(state, params).await,
        "execution/accept" => handle_execution_accept(state, params).await,
        // Report
        "report/generate" => handle_report_generate(state, params).await,
        "report/discuss" => handle_report_discuss(state, params).await,
        _ => Err(RpcError::UnknownMethod {
            method: method.to_string(),
        }
        .into()),
    }
}

async fn handle_session_create<A, S>(state: &AppState<A, S>) -> AppResult<Value>
where
    A: AssistantCall,
    S: ImageStore,
{
    let mut session = WorkflowSession::new();
    state.persist(&mut session).await?;
    info!(session_id = %session.id, "Session created");
    session_value(state, session)
}

async fn handle_session_get<A, S>(state: &AppState<A, S>, params: Option<Value>) -> AppResult<Value>
where
    A: AssistantCall,
    S: ImageStore,
{
    let params: SessionParams = parse_arguments("session/get", params)?;
    let session = state.load(&params.session_id).await?;
    session_value(state, session)
}

async fn handle_session_list<A, S>(state: &AppState<A, S>) -> AppResult<Value>
where
    A: AssistantCall,
    S: ImageStore,
{
    let sessions = state.storage.list_sessions().await?;
    Ok(json!({ "sessions": sessions }))
}

async fn handle_session_reset<A, S>(state: &AppState<A, S>, params: Option<Value>) -> AppResult<Value>
where
    A: AssistantCall,
    S: ImageStore,
{
    let params: SessionParams = parse_arguments("session/reset", params)?;
    let mut session = state.load(&params.session_id).await?;
    state.orchestrator.reset(&mut session.state);
    state.persist(&mut session).await?;
    session_value(state, session)
}

async fn handle_session_navigate<A, S>(
    state: &AppState<A, S>,
    params: Option<Value>,
) -> AppResult<Value>
where
    A: AssistantCall,
    S: ImageStore,
{
    let params: NavigateParams = parse_arguments("session/navigate", params)?;
    let mut session = state.load(&params.session_id).await?;
    state.orchestrator.navigate(&mut session.state, params.stage)?;
    state.persist(&mut session).await?;
    session_value(state, session)
}

async fn handle_session_upload<A, S>(state: &AppState<A, S>, params: Option<Value>) -> AppResult<Value>
where
    A: AssistantCall,
    S: ImageStore,
{
    let params: UploadParams = parse_arguments("session/upload", params)?;
    let mut session = state.load(&params.session_id).await?;
    session.state.record_upload(params.upload)?;
    state.persist(&mut session).await?;
    session_value(state, session)
}

async fn handle_summary_process<A, S>(state: &AppState<A, S>, params: Option<Value>) -> AppResult<Value>
where
    A: AssistantCall,
    S: ImageStore,
{
    let params: SessionParams = parse_arguments("summary/process", params)?;
    let mut session = state.load(&params.session_id).await?;
    state.orchestrator.process_files(&mut session.state).await?;
    state.persist(&mut session).await?;
    session_value(state, session)
}

async fn handle_summary_update_column<A, S>(
    state: &AppState<A, S>,
    params: Option<Value>,
) -> AppResult<Value>
where
    A: AssistantCall,
    S: ImageStore,
{
    let params: ColumnParams = parse_arguments("summary/update_column", params)?;
    let mut session = state.load(&params.session_id).await?;
    state.orchestrator.update_column(
        &mut session.state,
        &params.column_name,
        params.description,
        params.column_type,
    )?;
    state.persist(&mut session).await?;
    session_value(state, session)
}

async fn handle_hypotheses_refine<A, S>(
    state: &AppState<A, S>,
    params: Option<Value>,
) -> AppResult<Value>
where
    A: AssistantCall,
    S: ImageStore,
{
    let params: SessionParams = parse_arguments("hypotheses/refine", params)?;
    let mut session = state.load(&params.session_id).await?;
    let count = state.orchestrator.refine_hypotheses(&mut session.state).await?;
    state.persist(&mut session).await?;
    with_session(state, session, json!({ "hypotheses": count }))
}

async fn handle_hypothesis_discuss<A, S>(
    state: &AppState<A, S>,
    params: Option<Value>,
) -> AppResult<Value>
where
    A: AssistantCall,
    S: ImageStore,
{
    let params: RecordMessageParams = parse_arguments("hypothesis/discuss", params)?;
    let mut session = state.load(&params.session_id).await?;
    let reopened = state
        .orchestrator
        .discuss_hypothesis(&mut session.state, params.hypothesis_id, &params.message)
        .await?;
    state.persist(&mut session).await?;
    with_session(state, session, json!({ "reopened": reopened }))
}

async fn handle_hypothesis_accept<A, S>(
    state: &AppState<A, S>,
    params: Option<Value>,
) -> AppResult<Value>
where
    A: AssistantCall,
    S: ImageStore,
{
    let params: RecordParams = parse_arguments("hypothesis/accept", params)?;
    let mut session = state.load(&params.session_id).await?;
    state
        .orchestrator
        .accept_hypothesis(&mut session.state, params.hypothesis_id)?;
    state.persist(&mut session).await?;
    session_value(state, session)
}

async fn handle_plan_generate<A, S>(state: &AppState<A, S>, params: Option<Value>) -> AppResult<Value>
where
    A: AssistantCall,
    S: ImageStore,
{
    let params: RecordParams = parse_arguments("plan/generate", params)?;
    let mut session = state.load(&params.session_id).await?;
    state
        .orchestrator
        .generate_plan(&mut session.state, params.hypothesis_id)
        .await?;
    state.persist(&mut session).await?;
    session_value(state, session)
}

async fn handle_plan_discuss<A, S>(state: &AppState<A, S>, params: Option<Value>) -> AppResult<Value>
where
    A: AssistantCall,
    S: ImageStore,
{
    let params: RecordMessageParams = parse_arguments("plan/discuss", params)?;
    let mut session = state.load(&params.session_id).await?;
    state
        .orchestrator
        .discuss_plan(&mut session.state, params.hypothesis_id, &params.message)
        .await?;
    state.persist(&mut session).await?;
    session_value(state, session)
}

async fn handle_plan_accept<A, S>(state: &AppState<A, S>, params: Option<Value>) -> AppResult<Value>
where
    A: AssistantCall,
    S: ImageStore,
{
    let params: RecordParams = parse_arguments("plan/accept", params)?;
    let mut session = state.load(&params.session_id).await?;
    state
        .orchestrator
        .accept_plan(&mut session.state, params.hypothesis_id)?;
    state.persist(&mut session).await?;
    session_value(state, session)
}

async fn handle_plan_edit<A, S>(state: &AppState<A, S>, params: Option<Value>) -> AppResult<Value>
where
    A: AssistantCall,
    S: ImageStore,
{
    let params: RecordParams = parse_arguments("plan/edit", params)?;
    let mut session = state.load(&params.session_id).await?;
    state
        .orchestrator
        .edit_plan(&mut session.state, params.hypothesis_id)?;
    state.persist(&mut session).await?;
    session_value(state, session)
}

async fn handle_execution_run<A, S>(state: &AppState<A, S>, params: Option<Value>) -> AppResult<Value>
where
    A: AssistantCall,
    S: ImageStore,
{
    let params: ExecutionParams = parse_arguments("execution/run", params)?;
    let mut session = state.load(&params.session_id).await?;
    let segments = state
        .orchestrator
        .run_execution(&mut session.state, params.hypothesis_id, params.prompt)
        .await?;
    state.persist(&mut session).await?;
    with_session(state, session, json!({ "segments": segments }))
}

async fn handle_execution_accept<A, S>(
    state: &AppState<A, S>,
    params: Option<Value>,
) -> AppResult<Value>
where
    A: AssistantCall,
    S: ImageStore,
{
    let params: RecordParams = parse_arguments("execution/accept", params)?;
    let mut session = state.load(&params.session_id).await?;
    state
        .orchestrator
        .accept_execution(&mut session.state, params.hypothesis_id)?;
    state.persist(&mut session).await?;
    session_value(state, session)
}

async fn handle_report_generate<A, S>(
    state: &AppState<A, S>,
    params: Option<Value>,
) -> AppResult<Value>
where
    A: AssistantCall,
    S: ImageStore,
{
    let params: SessionParams = parse_arguments("report/generate", params)?;
    let mut session = state.load(&params.session_id).await?;
    state.orchestrator.generate_report(&mut session.state).await?;
    state.persist(&mut session).await?;
    session_value(state, session)
}

async fn handle_report_discuss<A, S>(
    state: &AppState<A, S>,
    params: Option<Value>,
) -> AppResult<Value>
where
    A: AssistantCall,
    S: ImageStore,
{
    let params: MessageParams = parse_arguments("report/discuss", params)?;
    let mut session = state.load(&params.session_id).await?;
    let segments = state
        .orchestrator
        .discuss_report(&mut session.state, &params.message)
        .await?;
    state.persist(&mut session).await?;
    with_session(state, session, json!({ "segments": segments }))
}

fn session_value<A, S>(state: &AppState<A, S>, session: WorkflowSession) -> AppResult<Value>
where
    A: AssistantCall,
    S: ImageStore,
{
    let rendered_report = state.orchestrator.render_report(&session.state);
    let view = SessionView::new(session, rendered_report);
    serde_json::to_value(view).map_err(|e| RpcError::Json(e).into())
}

/// Session view plus the operation's own output under `result`.
fn with_session<A, S>(state: &AppState<A, S>, session: WorkflowSession, result: Value) -> AppResult<Value>
where
    A: AssistantCall,
    S: ImageStore,
{
    Ok(json!({
        "session": session_value(state, session)?,
        "result": result,
    }))
}

/// Parse method parameters into a typed struct
fn parse_arguments<T: DeserializeOwned>(method: &str, params: Option<Value>) -> AppResult<T> {
    match params {
        Some(args) => serde_json::from_value(args).map_err(|e| {
            RpcError::InvalidParameters {
                method: method.to_string(),
                message: e.to_string(),
            }
            .into()
        }),
        None => Err(RpcError::InvalidParameters {
            method: method.to_string(),
            message: "Missing parameters".to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod handlers_tests;

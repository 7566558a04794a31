//! Unit tests for method routing and session persistence.

use super::*;
use crate::assistant::{AssistantReply, MockAssistantCall};
use crate::server::test_support::mock_state;
use pretty_assertions::assert_eq;
use serde_json::json;

fn summary_text() -> String {
    json!({"columns": {"season": {
        "column_name": "season", "description": "Season", "type": "categorical", "unique_value_count": 4
    }}})
    .to_string()
}

fn refinement_text() -> String {
    json!({
        "assistant_response": [
            {"title": "Spring song", "refined_hypothesis_text": "Song count is higher in spring"},
            {"title": "Dawn chorus", "refined_hypothesis_text": "Most songs happen at dawn"}
        ],
        "refined_hypothesis_text": ""
    })
    .to_string()
}

fn upload_params(session_id: &str) -> Value {
    json!({
        "session_id": session_id,
        "data_files": [{"name": "birds.csv", "file_id": "file-data"}],
        "hypotheses_text": "Birds sing more in spring"
    })
}

async fn create_session<A, S>(state: &AppState<A, S>) -> String
where
    A: AssistantCall,
    S: ImageStore,
{
    let created = handle_method(state, "session/create", None).await.unwrap();
    created["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_create_and_get_session() {
    let state = mock_state(MockAssistantCall::new()).await;
    let id = create_session(&state).await;

    let fetched = handle_method(&state, "session/get", Some(json!({"session_id": id})))
        .await
        .unwrap();
    assert_eq!(fetched["id"], json!(id));
    assert_eq!(fetched["state"]["stage"], json!("upload"));
    assert_eq!(fetched["rendered_report"], Value::Null);
    assert_eq!(fetched["available_stages"], json!(["upload"]));
    assert_eq!(fetched["record_status"], json!([]));
    assert_eq!(fetched["gates"]["all_hypotheses_accepted"], json!(false));
}

#[tokio::test]
async fn test_list_sessions() {
    let state = mock_state(MockAssistantCall::new()).await;
    create_session(&state).await;
    create_session(&state).await;

    let listed = handle_method(&state, "session/list", None).await.unwrap();
    assert_eq!(listed["sessions"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_method() {
    let state = mock_state(MockAssistantCall::new()).await;
    let err = handle_method(&state, "session/fly", None).await.unwrap_err();
    assert_eq!(err.rpc_code(), -32601);
}

#[tokio::test]
async fn test_missing_and_invalid_parameters() {
    let state = mock_state(MockAssistantCall::new()).await;

    let err = handle_method(&state, "session/get", None).await.unwrap_err();
    assert_eq!(err.rpc_code(), -32602);
    assert!(err.to_string().contains("Missing parameters"));

    let err = handle_method(&state, "session/get", Some(json!({"id": 1})))
        .await
        .unwrap_err();
    assert_eq!(err.rpc_code(), -32602);
}

#[tokio::test]
async fn test_unknown_session() {
    let state = mock_state(MockAssistantCall::new()).await;
    let err = handle_method(&state, "session/reset", Some(json!({"session_id": "nope"})))
        .await
        .unwrap_err();
    assert_eq!(err.rpc_code(), -32602);
}

#[tokio::test]
async fn test_navigate_forward_is_gated() {
    let state = mock_state(MockAssistantCall::new()).await;
    let id = create_session(&state).await;

    let err = handle_method(
        &state,
        "session/navigate",
        Some(json!({"session_id": id, "stage": "report"})),
    )
    .await
    .unwrap_err();
    assert_eq!(err.rpc_code(), -32001);
    assert!(err.to_string().contains("no data has been uploaded"));
}

#[tokio::test]
async fn test_upload_is_persisted() {
    let state = mock_state(MockAssistantCall::new()).await;
    let id = create_session(&state).await;

    handle_method(&state, "session/upload", Some(upload_params(&id)))
        .await
        .unwrap();

    let session = state.load(&id).await.unwrap();
    let upload = session.state.upload().unwrap();
    assert_eq!(upload.file_ids(), vec!["file-data".to_string()]);
}

#[tokio::test]
async fn test_failed_assistant_call_is_not_persisted() {
    let mut mock = MockAssistantCall::new();
    mock.expect_call().returning(|_| {
        Err(crate::error::AssistantError::Unavailable {
            message: "down".to_string(),
            retries: 3,
        })
    });
    let state = mock_state(mock).await;
    let id = create_session(&state).await;
    handle_method(&state, "session/upload", Some(upload_params(&id)))
        .await
        .unwrap();
    let before = state.load(&id).await.unwrap();

    let err = handle_method(&state, "summary/process", Some(json!({"session_id": id})))
        .await
        .unwrap_err();
    assert_eq!(err.rpc_code(), -32002);

    let after = state.load(&id).await.unwrap();
    assert_eq!(after.state, before.state);
    assert_eq!(after.updated_at, before.updated_at);
}

#[tokio::test]
async fn test_process_refine_and_accept_flow() {
    let mut mock = MockAssistantCall::new();
    let mut replies = vec![refinement_text(), summary_text()];
    mock.expect_call()
        .times(2)
        .returning(move |_| Ok(AssistantReply::Text(replies.pop().unwrap())));
    let state = mock_state(mock).await;
    let id = create_session(&state).await;

    handle_method(&state, "session/upload", Some(upload_params(&id)))
        .await
        .unwrap();
    let processed = handle_method(&state, "summary/process", Some(json!({"session_id": id})))
        .await
        .unwrap();
    assert_eq!(processed["state"]["stage"], json!("processing"));

    handle_method(
        &state,
        "summary/update_column",
        Some(json!({"session_id": id, "column_name": "season", "description": "Meteorological season"})),
    )
    .await
    .unwrap();

    let refined = handle_method(&state, "hypotheses/refine", Some(json!({"session_id": id})))
        .await
        .unwrap();
    assert_eq!(refined["result"]["hypotheses"], json!(2));
    assert_eq!(refined["session"]["state"]["stage"], json!("hypothesis_review"));

    assert_eq!(
        refined["session"]["available_stages"],
        json!(["upload", "processing", "hypothesis_review"])
    );

    let accepted = handle_method(
        &state,
        "hypothesis/accept",
        Some(json!({"session_id": id, "hypothesis_id": 0})),
    )
    .await
    .unwrap();
    assert_eq!(
        accepted["gates"],
        json!({"all_hypotheses_accepted": false, "all_plans_ready": false, "all_executed": false})
    );
    assert_eq!(
        accepted["record_status"],
        json!([
            {"id": 0, "hypothesis_status": "accepted", "plan_status": "no_plan", "execution_status": "not_run"},
            {"id": 1, "hypothesis_status": "discussing", "plan_status": "no_plan", "execution_status": "not_run"}
        ])
    );

    // One of two hypotheses accepted: plan review stays closed.
    let err = handle_method(
        &state,
        "session/navigate",
        Some(json!({"session_id": id, "stage": "plan_review"})),
    )
    .await
    .unwrap_err();
    assert_eq!(err.rpc_code(), -32001);
    assert!(err.to_string().contains("hypothesis 1 is not accepted"));

    let session = state.load(&id).await.unwrap();
    let column = session.state.data_summary().unwrap().column("season").unwrap();
    assert_eq!(column.description, "Meteorological season");
    assert!(session.state.record(0).unwrap().final_hypothesis().is_some());
}

#[tokio::test]
async fn test_reset_returns_to_upload() {
    let state = mock_state(MockAssistantCall::new()).await;
    let id = create_session(&state).await;
    handle_method(&state, "session/upload", Some(upload_params(&id)))
        .await
        .unwrap();

    let reset = handle_method(&state, "session/reset", Some(json!({"session_id": id})))
        .await
        .unwrap();
    assert_eq!(reset["state"]["stage"], json!("upload"));
    assert!(state.load(&id).await.unwrap().state.upload().is_none());
}

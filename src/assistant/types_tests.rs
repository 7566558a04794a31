//! Unit tests for assistant request/response types.

use super::*;
use serde_json::json;

#[test]
fn test_message_constructors() {
    let msg = Message::assistant("Here is the plan");
    assert_eq!(msg.role, MessageRole::Assistant);
    assert!(msg.image_file_ids.is_empty());

    let msg = Message::user("Hello").with_images(vec!["file-1".to_string()]);
    assert_eq!(msg.role, MessageRole::User);
    assert_eq!(msg.image_file_ids, vec!["file-1"]);
}

#[test]
fn test_message_serialization_skips_empty_images() {
    let value = serde_json::to_value(Message::assistant("Hi")).unwrap();
    assert_eq!(value, json!({"role": "assistant", "content": "Hi"}));
}

#[test]
fn test_request_new_defaults() {
    let req = AssistantRequest::new("gpt-4o", vec![Message::user("x")]);
    assert_eq!(req.model, "gpt-4o");
    assert!(!req.stream);
    assert!(req.tools.is_empty());
    assert!(req.schema.is_none());
    assert!(req.instructions.is_none());
}

#[test]
fn test_request_builders() {
    let req = AssistantRequest::new("gpt-4o", vec![])
        .with_instructions("Be brief")
        .with_tool(Tool::WebSearch)
        .with_tool(Tool::CodeInterpreter {
            file_ids: vec!["file-1".to_string()],
        })
        .with_temperature(0.2)
        .streaming();

    assert_eq!(req.instructions.as_deref(), Some("Be brief"));
    assert_eq!(req.tools.len(), 2);
    assert_eq!(req.temperature, Some(0.2));
    assert!(req.stream);
}

#[test]
fn test_request_serialization_shape() {
    let req = AssistantRequest::new("gpt-4o", vec![Message::user("x")]).with_tool(
        Tool::CodeInterpreter {
            file_ids: vec!["file-1".to_string()],
        },
    );
    let value = serde_json::to_value(&req).unwrap();
    assert_eq!(
        value,
        json!({
            "model": "gpt-4o",
            "input": [{"role": "user", "content": "x"}],
            "tools": [{"type": "code_interpreter", "file_ids": ["file-1"]}],
            "stream": false
        })
    );
}

#[test]
fn test_reply_text_from_events() {
    let reply = AssistantReply::Events(vec![
        StreamEvent::MessageStarted,
        StreamEvent::MessageTextDelta {
            fragment: "Hello ".to_string(),
        },
        StreamEvent::Unrecognized,
        StreamEvent::MessageTextDelta {
            fragment: "world".to_string(),
        },
    ]);
    assert_eq!(reply.into_text(), "Hello world");
}

#[test]
fn test_reply_events_from_text() {
    let events = AssistantReply::Text("done".to_string()).into_events();
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[1],
        StreamEvent::MessageTextDelta {
            fragment: "done".to_string()
        }
    );
}

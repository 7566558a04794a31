//! JSON schemas constraining structured assistant replies, and the typed
//! replies they decode into.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::types::ResponseSchema;
use crate::error::{AssistantError, AssistantResult};
use crate::plan::strip_code_fence;
use crate::workflow::RefinedHypothesis;

/// Reply to bulk hypothesis refinement.
#[derive(Debug, Clone, Deserialize)]
pub struct RefinementReply {
    pub assistant_response: Vec<RefinedHypothesis>,
    #[serde(default)]
    pub refined_hypothesis_text: String,
}

/// Reply to one hypothesis discussion turn.
#[derive(Debug, Clone, Deserialize)]
pub struct HypothesisChatReply {
    #[serde(default)]
    pub title: String,
    pub assistant_response: String,
    pub refined_hypothesis_text: String,
}

/// Reply to a planning turn.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanReply {
    pub assistant_response: String,
    #[serde(default)]
    pub current_plan_execution: String,
}

/// Decode a schema-constrained reply, tolerating a code fence around it.
pub fn decode_reply<T: DeserializeOwned>(text: &str) -> AssistantResult<T> {
    let body = strip_code_fence(text.trim());
    serde_json::from_str(body).map_err(|e| AssistantError::InvalidResponse {
        message: format!("Reply does not match schema: {}", e),
    })
}

pub fn data_summary_schema() -> ResponseSchema {
    ResponseSchema {
        name: "summary_schema".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "columns": {
                    "type": "object",
                    "additionalProperties": {
                        "type": "object",
                        "properties": {
                            "column_name": {"type": "string"},
                            "description": {"type": "string"},
                            "type": {"type": "string"},
                            "unique_value_count": {"type": "integer"}
                        },
                        "required": ["column_name", "description", "type", "unique_value_count"]
                    }
                }
            },
            "required": ["columns"]
        }),
        // Keyed maps cannot be expressed in strict mode.
        strict: false,
    }
}

pub fn hypotheses_schema() -> ResponseSchema {
    ResponseSchema {
        name: "hypotheses".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "assistant_response": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": {"type": "string"},
                            "hypothesis_refined_with_data_text": {"type": "string"},
                            "refined_hypothesis_text": {"type": "string"}
                        },
                        "required": [
                            "title",
                            "hypothesis_refined_with_data_text",
                            "refined_hypothesis_text"
                        ],
                        "additionalProperties": false
                    }
                },
                "refined_hypothesis_text": {"type": "string"}
            },
            "required": ["assistant_response", "refined_hypothesis_text"],
            "additionalProperties": false
        }),
        strict: true,
    }
}

pub fn hypothesis_chat_schema() -> ResponseSchema {
    ResponseSchema {
        name: "hypothesis".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "assistant_response": {"type": "string"},
                "refined_hypothesis_text": {"type": "string"}
            },
            "required": ["title", "assistant_response", "refined_hypothesis_text"],
            "additionalProperties": false
        }),
        strict: true,
    }
}

pub fn plan_schema() -> ResponseSchema {
    ResponseSchema {
        name: "plan_generation_response".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "assistant_response": {"type": "string"},
                "current_plan_execution": {"type": "string"}
            },
            "required": ["assistant_response", "current_plan_execution"],
            "additionalProperties": false
        }),
        strict: true,
    }
}

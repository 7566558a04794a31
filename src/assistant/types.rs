use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transcript::StreamEvent;

/// Message in an assistant conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    /// Images from earlier turns, re-attached by file id.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_file_ids: Vec<String>,
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl Message {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::Assistant, content)
    }

    fn with_role(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            image_file_ids: Vec::new(),
        }
    }

    /// Attach previously generated images by file id
    pub fn with_images(mut self, file_ids: Vec<String>) -> Self {
        self.image_file_ids = file_ids;
        self
    }
}

/// Tool made available to the assistant for one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tool {
    WebSearch,
    CodeInterpreter {
        #[serde(default)]
        file_ids: Vec<String>,
    },
}

/// A named JSON schema the reply text must conform to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: Value,
    pub strict: bool,
}

/// One call to the assistant service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub input: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<ResponseSchema>,
    /// Request an event stream instead of a single text reply
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl AssistantRequest {
    /// Create a non-streaming request
    pub fn new(model: impl Into<String>, input: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            instructions: None,
            input,
            tools: Vec::new(),
            schema: None,
            stream: false,
            temperature: None,
        }
    }

    /// Set the system instructions
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Add a tool
    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    /// Constrain the reply to a JSON schema
    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Ask for a streamed reply
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Non-streaming response body
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseBody {
    pub output_text: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// What the assistant returned
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantReply {
    Text(String),
    Events(Vec<StreamEvent>),
}

impl AssistantReply {
    /// Reply text. A streamed reply contributes its message text deltas.
    pub fn into_text(self) -> String {
        match self {
            AssistantReply::Text(text) => text,
            AssistantReply::Events(events) => events
                .into_iter()
                .filter_map(|e| match e {
                    StreamEvent::MessageTextDelta { fragment } => Some(fragment),
                    _ => None,
                })
                .collect(),
        }
    }

    /// Reply as events. A plain text reply becomes one message.
    pub fn into_events(self) -> Vec<StreamEvent> {
        match self {
            AssistantReply::Events(events) => events,
            AssistantReply::Text(text) => vec![
                StreamEvent::MessageStarted,
                StreamEvent::MessageTextDelta { fragment: text },
            ],
        }
    }
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;

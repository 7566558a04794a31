//! Remote assistant collaborator.
//!
//! [`AssistantCall`] is the seam the orchestrator talks to; [`AssistantClient`]
//! implements it over HTTP with timeouts and retry backoff.

mod client;
pub mod schemas;
mod types;

pub use client::{decode_event_stream, AssistantClient};
pub use types::{
    AssistantReply, AssistantRequest, Message, MessageRole, ResponseBody, ResponseSchema, Tool,
};

use async_trait::async_trait;

use crate::error::AssistantResult;

/// A language-model assistant that can answer requests and serve the files
/// (images) its tools produced.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssistantCall: Send + Sync {
    /// Run one request.
    async fn call(&self, request: AssistantRequest) -> AssistantResult<AssistantReply>;

    /// Download the content of a file produced by a tool.
    async fn fetch_file(&self, file_id: &str) -> AssistantResult<Vec<u8>>;
}

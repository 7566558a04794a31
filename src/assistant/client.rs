use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{AssistantReply, AssistantRequest, ResponseBody};
use super::AssistantCall;
use crate::config::{AssistantConfig, RequestConfig};
use crate::error::{AssistantError, AssistantResult};
use crate::transcript::StreamEvent;

/// HTTP client for the assistant service
#[derive(Clone)]
pub struct AssistantClient {
    client: Client,
    base_url: String,
    api_key: String,
    request_config: RequestConfig,
}

impl AssistantClient {
    /// Create a new assistant client
    pub fn new(config: &AssistantConfig, request_config: RequestConfig) -> AssistantResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(AssistantError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run `attempt` with exponential backoff between failures
    async fn with_retries<T, F, Fut>(&self, operation: &str, mut attempt: F) -> AssistantResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = AssistantResult<T>>,
    {
        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = backoff_delay(self.request_config.retry_delay_ms, retries);
                warn!(
                    operation = %operation,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying assistant request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match attempt().await {
                Ok(value) => {
                    info!(
                        operation = %operation,
                        latency_ms = start.elapsed().as_millis(),
                        "Assistant call succeeded"
                    );
                    return Ok(value);
                }
                Err(e) => {
                    error!(
                        operation = %operation,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Assistant call failed"
                    );
                    let retryable = is_retryable(&e);
                    last_error = Some(e);
                    retries += 1;
                    if !retryable {
                        break;
                    }
                }
            }
        }

        match last_error {
            Some(e) if !is_retryable(&e) => Err(e),
            last => Err(AssistantError::Unavailable {
                message: last
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "Unknown error".to_string()),
                retries,
            }),
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> AssistantError {
        if e.is_timeout() {
            AssistantError::Timeout {
                timeout_ms: self.request_config.timeout_ms,
            }
        } else {
            AssistantError::Http(e)
        }
    }

    /// Execute a single request (internal)
    async fn execute_request(&self, request: &AssistantRequest) -> AssistantResult<AssistantReply> {
        let url = format!("{}/v1/responses", self.base_url);
        debug!(
            model = %request.model,
            messages = request.input.len(),
            tools = request.tools.len(),
            stream = request.stream,
            "Calling assistant"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let response = check_status(response).await?;

        if request.stream {
            let body = response.text().await.map_err(|e| self.map_send_error(e))?;
            return Ok(AssistantReply::Events(decode_event_stream(&body)?));
        }

        let body: ResponseBody =
            response
                .json()
                .await
                .map_err(|e| AssistantError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        debug!(
            model = body.model.as_deref().unwrap_or("unknown"),
            chars = body.output_text.len(),
            "Assistant replied"
        );
        Ok(AssistantReply::Text(body.output_text))
    }

    async fn execute_fetch(&self, file_id: &str) -> AssistantResult<Vec<u8>> {
        let url = format!("{}/v1/files/{}/content", self.base_url, file_id);
        debug!(file_id = %file_id, "Fetching file content");

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let response = check_status(response).await?;
        let bytes = response.bytes().await.map_err(|e| self.map_send_error(e))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl AssistantCall for AssistantClient {
    async fn call(&self, request: AssistantRequest) -> AssistantResult<AssistantReply> {
        let operation = format!("responses:{}", request.model);
        self.with_retries(&operation, || self.execute_request(&request))
            .await
    }

    async fn fetch_file(&self, file_id: &str) -> AssistantResult<Vec<u8>> {
        self.with_retries("files:content", || self.execute_fetch(file_id))
            .await
    }
}

async fn check_status(response: Response) -> AssistantResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_body = response.text().await.unwrap_or_default();
    Err(AssistantError::Api {
        status: status.as_u16(),
        message: error_body,
    })
}

/// Delay before retry number `retry` (1-based), doubling each time.
fn backoff_delay(base_ms: u64, retry: u32) -> Duration {
    let factor = 2_u64.checked_pow(retry.saturating_sub(1)).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor))
}

/// Client errors other than rate limiting will not succeed on retry.
fn is_retryable(error: &AssistantError) -> bool {
    match error {
        AssistantError::Api { status, .. } => *status == 429 || *status >= 500,
        AssistantError::InvalidResponse { .. } => false,
        _ => true,
    }
}

/// Decode a `text/event-stream` body of `data: <event JSON>` lines.
///
/// Lines that are not `data:` fields are skipped; `data: [DONE]` ends the
/// stream. Event tags this crate does not know, and events that fail to
/// decode, become [`StreamEvent::Unrecognized`] so the rest of the turn
/// survives. A stream in which no event decodes is an invalid response.
pub fn decode_event_stream(body: &str) -> AssistantResult<Vec<StreamEvent>> {
    let mut events = Vec::new();
    let mut decoded = 0usize;
    let mut first_error = None;
    for line in body.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data.is_empty() {
            continue;
        }
        if data == "[DONE]" {
            break;
        }
        match serde_json::from_str::<StreamEvent>(data) {
            Ok(event) => {
                decoded += 1;
                events.push(event);
            }
            Err(e) => {
                warn!(error = %e, event = %data, "Skipping malformed stream event");
                first_error.get_or_insert(e);
                events.push(StreamEvent::Unrecognized);
            }
        }
    }

    match first_error {
        Some(e) if decoded == 0 => Err(AssistantError::InvalidResponse {
            message: format!("Malformed stream event: {}", e),
        }),
        _ => Ok(events),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::StepTool;

    #[test]
    fn test_client_creation() {
        let config = AssistantConfig {
            api_key: "test_key".to_string(),
            base_url: "https://api.example.com/".to_string(),
        };

        let client = AssistantClient::new(&config, RequestConfig::default()).unwrap();
        assert_eq!(client.base_url(), "https://api.example.com");
    }

    #[test]
    fn test_decode_event_stream() {
        let body = "event: delta\n\
                    data: {\"type\": \"message_started\"}\n\n\
                    data: {\"type\": \"message_text_delta\", \"fragment\": \"hi\"}\n\n\
                    data: {\"type\": \"heartbeat\"}\n\n\
                    data: [DONE]\n\n\
                    data: {\"type\": \"message_started\"}\n";
        let events = decode_event_stream(body).unwrap();
        assert_eq!(
            events,
            vec![
                StreamEvent::MessageStarted,
                StreamEvent::MessageTextDelta {
                    fragment: "hi".to_string()
                },
                StreamEvent::Unrecognized,
            ]
        );
    }

    #[test]
    fn test_decode_event_stream_keeps_events_around_a_bad_line() {
        let body = "data: {\"type\": \"step_text_delta\", \"tool\": \"code\", \"fragment\": \"x = 1\"}\n\n\
                    data: {\"type\": \"step_text_delta\", \"tool\": \"code\"}\n\n\
                    data: {\"kind\": \"heartbeat\"}\n\n\
                    data: {\"type\": \"message_text_delta\", \"fragment\": \"done\"}\n\n\
                    data: [DONE]\n";
        let events = decode_event_stream(body).unwrap();
        assert_eq!(
            events,
            vec![
                StreamEvent::StepTextDelta {
                    tool: StepTool::Code,
                    fragment: "x = 1".to_string()
                },
                StreamEvent::Unrecognized,
                StreamEvent::Unrecognized,
                StreamEvent::MessageTextDelta {
                    fragment: "done".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_decode_event_stream_rejects_only_malformed_json() {
        let err = decode_event_stream("data: {not json}\ndata: {\"kind\": 1}\n").unwrap_err();
        assert!(matches!(err, AssistantError::InvalidResponse { .. }));

        assert_eq!(decode_event_stream("data: [DONE]\n").unwrap(), vec![]);
    }

    #[test]
    fn test_backoff_delay_doubles_and_saturates() {
        assert_eq!(backoff_delay(100, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(100, 3), Duration::from_millis(400));
        assert_eq!(backoff_delay(1000, 65), Duration::from_millis(u64::MAX));
        assert_eq!(backoff_delay(1000, u32::MAX), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&AssistantError::Api {
            status: 503,
            message: String::new()
        }));
        assert!(is_retryable(&AssistantError::Api {
            status: 429,
            message: String::new()
        }));
        assert!(!is_retryable(&AssistantError::Api {
            status: 400,
            message: String::new()
        }));
        assert!(is_retryable(&AssistantError::Timeout { timeout_ms: 1 }));
    }
}

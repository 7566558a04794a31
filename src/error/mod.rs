use thiserror::Error;

use crate::workflow::Stage;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Assistant error: {0}")]
    Assistant(#[from] AssistantError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Corrupt session snapshot {session_id}: {message}")]
    Snapshot { session_id: String, message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Assistant service errors
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("Assistant unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Plan parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("Plan input is empty")]
    Empty,
}

/// Image store errors
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Image not found: {file_id}")]
    NotFound { file_id: String },

    #[error("Image I/O failed for {file_id}: {source}")]
    Io {
        file_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image store lock poisoned")]
    Poisoned,
}

/// Workflow state machine errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("Cannot enter {target}: {unmet}")]
    GatingViolation { target: Stage, unmet: String },

    #[error("Hypothesis record not found: {id}")]
    RecordNotFound { id: usize },

    #[error("Invalid transition for hypothesis {id}: {message}")]
    InvalidTransition { id: usize, message: String },

    #[error("Precondition unmet: {message}")]
    PreconditionUnmet { message: String },
}

/// JSON-RPC surface errors
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown method: {method}")]
    UnknownMethod { method: String },

    #[error("Invalid parameters for {method}: {message}")]
    InvalidParameters { method: String, message: String },

    #[error("Session not found: {session_id}")]
    UnknownSession { session_id: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// JSON-RPC error code used when this error crosses the stdio surface.
    pub fn rpc_code(&self) -> i32 {
        match self {
            AppError::Workflow(WorkflowError::GatingViolation { .. }) => -32001,
            AppError::Workflow(_) => -32003,
            AppError::Assistant(_) => -32002,
            AppError::Plan(_) => -32004,
            AppError::Rpc(RpcError::UnknownMethod { .. }) => -32601,
            AppError::Rpc(RpcError::InvalidParameters { .. })
            | AppError::Rpc(RpcError::UnknownSession { .. }) => -32602,
            AppError::Rpc(RpcError::InvalidRequest { .. }) => -32600,
            _ => -32603,
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for assistant operations
pub type AssistantResult<T> = Result<T, AssistantError>;

/// Result type alias for plan parsing
pub type PlanResult<T> = Result<T, PlanError>;

/// Result type alias for image store operations
pub type ImageResult<T> = Result<T, ImageError>;

/// Result type alias for workflow transitions
pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_assistant_error_display() {
        let err = AssistantError::Unavailable {
            message: "server down".to_string(),
            retries: 3,
        };
        assert_eq!(err.to_string(), "Assistant unavailable: server down (retries: 3)");

        let err = AssistantError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 401 - unauthorized");

        let err = AssistantError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_gating_violation_names_unmet_precondition() {
        let err = WorkflowError::GatingViolation {
            target: Stage::PlanReview,
            unmet: "hypothesis 2 is not accepted".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot enter plan_review: hypothesis 2 is not accepted"
        );
    }

    #[test]
    fn test_workflow_error_display() {
        let err = WorkflowError::RecordNotFound { id: 7 };
        assert_eq!(err.to_string(), "Hypothesis record not found: 7");

        let err = WorkflowError::InvalidTransition {
            id: 1,
            message: "nothing to accept".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid transition for hypothesis 1: nothing to accept"
        );
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Snapshot {
            session_id: "sess-123".to_string(),
            message: "expected value".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Corrupt session snapshot sess-123: expected value"
        );
    }

    #[test]
    fn test_rpc_codes() {
        let gating: AppError = WorkflowError::GatingViolation {
            target: Stage::Report,
            unmet: "x".to_string(),
        }
        .into();
        assert_eq!(gating.rpc_code(), -32001);

        let assistant: AppError = AssistantError::Timeout { timeout_ms: 1 }.into();
        assert_eq!(assistant.rpc_code(), -32002);

        let unknown: AppError = RpcError::UnknownMethod {
            method: "nope".to_string(),
        }
        .into();
        assert_eq!(unknown.rpc_code(), -32601);
    }

    #[test]
    fn test_plan_error_conversion_to_app_error() {
        let app_err: AppError = PlanError::Empty.into();
        assert!(matches!(app_err, AppError::Plan(PlanError::Empty)));
    }
}

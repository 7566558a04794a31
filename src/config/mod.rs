use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub assistant: AssistantConfig,
    pub models: ModelConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub images: ImageConfig,
}

/// Assistant service configuration
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub api_key: String,
    pub base_url: String,
}

/// Model used for each workflow stage
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub refinement: String,
    pub planning: String,
    pub execution: String,
    pub report: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Where execution images are written and how wide they render
#[derive(Debug, Clone)]
pub struct ImageConfig {
    pub dir: PathBuf,
    pub width: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let assistant = AssistantConfig {
            api_key: env::var("ASSISTANT_API_KEY").map_err(|_| AppError::Config {
                message: "ASSISTANT_API_KEY is required".to_string(),
            })?,
            base_url: env::var("ASSISTANT_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
        };

        let defaults = ModelConfig::default();
        let models = ModelConfig {
            refinement: env::var("MODEL_REFINEMENT").unwrap_or(defaults.refinement),
            planning: env::var("MODEL_PLANNING").unwrap_or(defaults.planning),
            execution: env::var("MODEL_EXECUTION").unwrap_or(defaults.execution),
            report: env::var("MODEL_REPORT").unwrap_or(defaults.report),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/workflow.db".to_string()),
            ),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300_000),
            max_retries: env::var("MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            retry_delay_ms: env::var("RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
        };

        let images = ImageConfig {
            dir: PathBuf::from(
                env::var("IMAGE_DIR").unwrap_or_else(|_| "./data/images".to_string()),
            ),
            width: env::var("IMAGE_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(600),
        };

        Ok(Config {
            assistant,
            models,
            database,
            logging,
            request,
            images,
        })
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 300_000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            refinement: "gpt-4o".to_string(),
            planning: "gpt-4o".to_string(),
            execution: "gpt-4o".to_string(),
            report: "gpt-4.1".to_string(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data/images"),
            width: 600,
        }
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::{SessionSummary, Storage, WorkflowSession};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::workflow::Stage;

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create an in-memory instance (tests and throwaway sessions)
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        // A single connection, otherwise every pooled connection would see
        // its own empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save_session(&self, session: &WorkflowSession) -> StorageResult<()> {
        let state = serde_json::to_string(&session.state).map_err(|e| StorageError::Snapshot {
            session_id: session.id.clone(),
            message: e.to_string(),
        })?;

        sqlx::query(
            r#"
            INSERT INTO workflow_sessions (id, stage, hypotheses, state, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                stage = excluded.stage,
                hypotheses = excluded.hypotheses,
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&session.id)
        .bind(session.state.stage().to_string())
        .bind(session.state.records().len() as i64)
        .bind(&state)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(session_id = %session.id, stage = %session.state.stage(), "Session saved");
        Ok(())
    }

    async fn load_session(&self, id: &str) -> StorageResult<Option<WorkflowSession>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, state, created_at, updated_at
            FROM workflow_sessions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(WorkflowSession::try_from).transpose()
    }

    async fn list_sessions(&self) -> StorageResult<Vec<SessionSummary>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            r#"
            SELECT id, stage, hypotheses, created_at, updated_at
            FROM workflow_sessions
            ORDER BY updated_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SessionSummary::from).collect())
    }

    async fn delete_session(&self, id: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM workflow_sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    state: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SessionRow> for WorkflowSession {
    type Error = StorageError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let state = serde_json::from_str(&row.state).map_err(|e| StorageError::Snapshot {
            session_id: row.id.clone(),
            message: e.to_string(),
        })?;

        Ok(Self {
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
            id: row.id,
            state,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: String,
    stage: String,
    hypotheses: i64,
    created_at: String,
    updated_at: String,
}

impl From<SummaryRow> for SessionSummary {
    fn from(row: SummaryRow) -> Self {
        let stage = Stage::from_str(&row.stage).unwrap_or_else(|e| {
            warn!(session_id = %row.id, error = %e, "Unknown stored stage");
            Stage::Upload
        });

        Self {
            stage,
            hypotheses: usize::try_from(row.hypotheses).unwrap_or(0),
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
            id: row.id,
        }
    }
}

// Database row shapes for the Postgres-backed session and run-log stores.
// Kept distinct from `agentcore`'s domain types (`Session`, `RunRecord`,
// `RunLogEvent`) so a schema change here doesn't ripple into the core crate.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub owner_name: String,
    pub user_id: Option<String>,
    pub state: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateSessionRow {
    pub id: Uuid,
    pub owner_name: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct RunRecordRow {
    pub run_id: Uuid,
    pub session_id: Uuid,
    pub parent_run_id: Option<Uuid>,
    pub runner_type: String,
    pub runner_name: String,
    pub task: String,
    pub response: String,
    pub success: bool,
    pub steps: i32,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateRunRecordRow {
    pub run_id: Uuid,
    pub session_id: Uuid,
    pub parent_run_id: Option<Uuid>,
    pub runner_type: String,
    pub runner_name: String,
    pub task: String,
    pub response: String,
    pub success: bool,
    pub steps: i32,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct RunLogEventRow {
    pub run_id: Uuid,
    pub sequence: i32,
    pub kind: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateRunLogEventRow {
    pub run_id: Uuid,
    pub kind: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct RunLogSummaryRow {
    pub run_id: Uuid,
    pub steps: i32,
    pub success: bool,
    pub event_count: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

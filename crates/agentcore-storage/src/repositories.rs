// Repository layer: plain sqlx queries over the session/run_record/run_log
// tables. Kept independent of the `SessionManager`/`RunLogSink` trait impls
// in `pg_session.rs`/`pg_run_log.rs` so the query layer can be tested and
// read on its own, the way the query layer was laid out before it.

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::*;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn from_url(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ============================================
    // Sessions
    // ============================================

    pub async fn create_session(&self, input: CreateSessionRow) -> Result<SessionRow> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            INSERT INTO sessions (id, owner_name, user_id, state)
            VALUES ($1, $2, $3, '{}'::jsonb)
            ON CONFLICT (id) DO NOTHING
            RETURNING id, owner_name, user_id, state, created_at, updated_at
            "#,
        )
        .bind(input.id)
        .bind(&input.owner_name)
        .bind(&input.user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row),
            // conflict: session already exists, fetch it instead
            None => self
                .get_session(input.id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("session {} vanished after insert conflict", input.id)),
        }
    }

    pub async fn get_session(&self, id: Uuid) -> Result<Option<SessionRow>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, owner_name, user_id, state, created_at, updated_at
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn touch_session(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE sessions SET updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_session_ids(&self) -> Result<Vec<Uuid>> {
        let ids: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM sessions")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    pub async fn delete_session(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_sessions_older_than(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE updated_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ============================================
    // Run records
    // ============================================

    pub async fn create_run_record(&self, input: CreateRunRecordRow) -> Result<RunRecordRow> {
        let row = sqlx::query_as::<_, RunRecordRow>(
            r#"
            INSERT INTO run_records (run_id, session_id, parent_run_id, runner_type, runner_name, task, response, success, steps, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING run_id, session_id, parent_run_id, runner_type, runner_name, task, response, success, steps, metadata, created_at
            "#,
        )
        .bind(input.run_id)
        .bind(input.session_id)
        .bind(input.parent_run_id)
        .bind(&input.runner_type)
        .bind(&input.runner_name)
        .bind(&input.task)
        .bind(&input.response)
        .bind(input.success)
        .bind(input.steps)
        .bind(&input.metadata)
        .bind(input.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_run_records(&self, session_id: Uuid) -> Result<Vec<RunRecordRow>> {
        let rows = sqlx::query_as::<_, RunRecordRow>(
            r#"
            SELECT run_id, session_id, parent_run_id, runner_type, runner_name, task, response, success, steps, metadata, created_at
            FROM run_records
            WHERE session_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Keep only the most recent `max_runs` records for a session.
    pub async fn trim_run_records(&self, session_id: Uuid, max_runs: i64) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM run_records
            WHERE session_id = $1
              AND run_id NOT IN (
                  SELECT run_id FROM run_records
                  WHERE session_id = $1
                  ORDER BY created_at DESC
                  LIMIT $2
              )
            "#,
        )
        .bind(session_id)
        .bind(max_runs)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ============================================
    // Run log events
    // ============================================

    pub async fn create_run_log_event(&self, input: CreateRunLogEventRow) -> Result<RunLogEventRow> {
        // Per-run sequence, same "next = max + 1" pattern as session message
        // sequencing: monotonic and gap-free within a run.
        let row = sqlx::query_as::<_, RunLogEventRow>(
            r#"
            INSERT INTO run_log_events (run_id, sequence, kind, payload, created_at)
            VALUES ($1, COALESCE((SELECT MAX(sequence) + 1 FROM run_log_events WHERE run_id = $1), 0), $2, $3, $4)
            RETURNING run_id, sequence, kind, payload, created_at
            "#,
        )
        .bind(input.run_id)
        .bind(&input.kind)
        .bind(&input.payload)
        .bind(input.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_run_log_events(&self, run_id: Uuid) -> Result<Vec<RunLogEventRow>> {
        let rows = sqlx::query_as::<_, RunLogEventRow>(
            r#"
            SELECT run_id, sequence, kind, payload, created_at
            FROM run_log_events
            WHERE run_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn upsert_run_log_summary(&self, summary: RunLogSummaryRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO run_log_summaries (run_id, steps, success, event_count, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (run_id) DO UPDATE SET
                steps = EXCLUDED.steps,
                success = EXCLUDED.success,
                event_count = EXCLUDED.event_count,
                completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(summary.run_id)
        .bind(summary.steps)
        .bind(summary.success)
        .bind(summary.event_count)
        .bind(summary.started_at)
        .bind(summary.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_run_log_summary(&self, run_id: Uuid) -> Result<Option<RunLogSummaryRow>> {
        let row = sqlx::query_as::<_, RunLogSummaryRow>(
            r#"
            SELECT run_id, steps, success, event_count, started_at, completed_at
            FROM run_log_summaries
            WHERE run_id = $1
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}

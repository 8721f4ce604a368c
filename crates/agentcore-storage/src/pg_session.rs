// Postgres-backed SessionManager: assembles an `agentcore::Session` from a
// session row plus its ordered run records, the way a session row used to
// be joined against its conversation's message rows.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use uuid::Uuid;

use agentcore::error::{AgentError, Result};
use agentcore::session::{RunRecord, RunnerType, Session, SessionManager};

use crate::models::{CreateRunRecordRow, CreateSessionRow};
use crate::repositories::Database;

pub struct PgSessionManager {
    db: Database,
}

impl PgSessionManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn runner_type_str(runner_type: RunnerType) -> &'static str {
    match runner_type {
        RunnerType::Agent => "agent",
        RunnerType::TeamLeader => "team_leader",
        RunnerType::Member => "member",
        RunnerType::TeamDependency => "team_dependency",
    }
}

fn parse_runner_type(value: &str) -> Result<RunnerType> {
    match value {
        "agent" => Ok(RunnerType::Agent),
        "team_leader" => Ok(RunnerType::TeamLeader),
        "member" => Ok(RunnerType::Member),
        "team_dependency" => Ok(RunnerType::TeamDependency),
        other => Err(AgentError::session(format!("unknown runner_type '{other}' in run_records row"))),
    }
}

#[async_trait]
impl SessionManager for PgSessionManager {
    async fn add_run(
        &self,
        session_id: Option<Uuid>,
        owner_name: &str,
        user_id: Option<&str>,
        run: RunRecord,
    ) -> Result<Uuid> {
        let id = session_id.unwrap_or_else(Uuid::now_v7);

        self.db
            .create_session(CreateSessionRow {
                id,
                owner_name: owner_name.to_string(),
                user_id: user_id.map(str::to_string),
            })
            .await
            .map_err(|e| AgentError::session(e.to_string()))?;

        self.db
            .create_run_record(CreateRunRecordRow {
                run_id: run.run_id,
                session_id: id,
                parent_run_id: run.parent_run_id,
                runner_type: runner_type_str(run.runner_type).to_string(),
                runner_name: run.runner_name,
                task: run.task,
                response: run.response,
                success: run.success,
                steps: run.steps as i32,
                metadata: run.metadata,
                created_at: run.timestamp,
            })
            .await
            .map_err(|e| AgentError::session(e.to_string()))?;

        self.db.touch_session(id).await.map_err(|e| AgentError::session(e.to_string()))?;

        Ok(id)
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>> {
        let Some(row) = self
            .db
            .get_session(session_id)
            .await
            .map_err(|e| AgentError::session(e.to_string()))?
        else {
            return Ok(None);
        };

        let run_rows = self
            .db
            .list_run_records(session_id)
            .await
            .map_err(|e| AgentError::session(e.to_string()))?;

        let mut runs = Vec::with_capacity(run_rows.len());
        for run_row in run_rows {
            let mut run = RunRecord::new(
                parse_runner_type(&run_row.runner_type)?,
                run_row.runner_name,
                run_row.task,
                run_row.response,
                run_row.success,
                run_row.steps as usize,
            );
            run.run_id = run_row.run_id;
            run.parent_run_id = run_row.parent_run_id;
            run.timestamp = run_row.created_at;
            run.metadata = run_row.metadata;
            runs.push(run);
        }

        let state: HashMap<String, serde_json::Value> = serde_json::from_value(row.state).unwrap_or_default();

        Ok(Some(Session {
            session_id: row.id,
            owner_name: row.owner_name,
            user_id: row.user_id,
            runs,
            state,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }))
    }

    async fn list_sessions(&self) -> Result<Vec<Uuid>> {
        self.db.list_session_ids().await.map_err(|e| AgentError::session(e.to_string()))
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<()> {
        self.db
            .delete_session(session_id)
            .await
            .map_err(|e| AgentError::session(e.to_string()))?;
        Ok(())
    }

    async fn trim_session_runs(&self, session_id: Uuid, max_runs: usize) -> Result<()> {
        self.db
            .trim_run_records(session_id, max_runs as i64)
            .await
            .map_err(|e| AgentError::session(e.to_string()))
    }

    async fn cleanup_old_sessions(&self, max_age_days: i64) -> Result<usize> {
        let cutoff = chrono::Utc::now() - ChronoDuration::days(max_age_days);
        let removed = self
            .db
            .delete_sessions_older_than(cutoff)
            .await
            .map_err(|e| AgentError::session(e.to_string()))?;
        Ok(removed as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_type_round_trips_through_its_string_form() {
        for rt in [RunnerType::Agent, RunnerType::TeamLeader, RunnerType::Member, RunnerType::TeamDependency] {
            let s = runner_type_str(rt);
            let parsed = parse_runner_type(s).unwrap();
            assert_eq!(runner_type_str(parsed), s);
        }
    }

    #[test]
    fn unknown_runner_type_string_is_rejected() {
        assert!(parse_runner_type("bogus").is_err());
    }
}

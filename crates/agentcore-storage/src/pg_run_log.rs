// Postgres-backed RunLogSink: each logged event becomes a row in
// `run_log_events`, keyed by `(run_id, sequence)`; `finalize` upserts the
// fast-index summary row the way a run's completion used to update a
// conversation's summary columns.

use async_trait::async_trait;

use agentcore::error::{AgentError, Result};
use agentcore::run_logger::{RunLogEvent, RunLogSink, RunLogSummary};

use crate::models::{CreateRunLogEventRow, RunLogSummaryRow};
use crate::repositories::Database;

pub struct PgRunLogSink {
    db: Database,
}

impl PgRunLogSink {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn event_kind_str(kind: agentcore::run_logger::LogEventKind) -> &'static str {
    use agentcore::run_logger::LogEventKind::*;
    match kind {
        RunStart => "run_start",
        Step => "step",
        Request => "request",
        Response => "response",
        ToolExecution => "tool_execution",
        Completion => "completion",
        Event => "event",
    }
}

#[async_trait]
impl RunLogSink for PgRunLogSink {
    async fn write(&self, event: RunLogEvent) -> Result<()> {
        self.db
            .create_run_log_event(CreateRunLogEventRow {
                run_id: event.run_id,
                kind: event_kind_str(event.kind).to_string(),
                payload: event.payload,
                created_at: event.timestamp,
            })
            .await
            .map_err(|e| AgentError::run_log(e.to_string()))?;
        Ok(())
    }

    async fn finalize(&self, summary: RunLogSummary) -> Result<()> {
        self.db
            .upsert_run_log_summary(RunLogSummaryRow {
                run_id: summary.run_id,
                steps: summary.steps as i32,
                success: summary.success,
                event_count: summary.event_count as i32,
                started_at: summary.started_at,
                completed_at: summary.completed_at,
            })
            .await
            .map_err(|e| AgentError::run_log(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_round_trips_every_variant() {
        use agentcore::run_logger::LogEventKind::*;
        for kind in [RunStart, Step, Request, Response, ToolExecution, Completion, Event] {
            assert!(!event_kind_str(kind).is_empty());
        }
    }
}

// Per-run structured event log (RunLogger), distinct from `tracing`:
// `tracing` is operator-facing diagnostic logging, this is the per-run
// JSON-serializable event tape a caller can replay or index.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AgentError, Result};

/// Payloads are truncated to this many characters before being written to
/// the log sink. The full content always remains in the message history;
/// this only bounds the audit trail.
const LOG_PAYLOAD_TRUNCATE_CHARS: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEventKind {
    RunStart,
    Step,
    Request,
    Response,
    ToolExecution,
    Completion,
    Event,
}

/// One entry in a run's event tape.
#[derive(Debug, Clone, Serialize)]
pub struct RunLogEvent {
    pub run_id: Uuid,
    /// Monotonically increasing within this run, starting at 0.
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub kind: LogEventKind,
    pub payload: serde_json::Value,
}

/// Fast-index summary written alongside the full event tape, so callers
/// don't need to scan a JSONL file just to learn whether a run succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct RunLogSummary {
    pub run_id: Uuid,
    pub steps: usize,
    pub success: bool,
    pub event_count: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Pluggable sink a `RunLogger` writes its event tape to.
#[async_trait]
pub trait RunLogSink: Send + Sync {
    async fn write(&self, event: RunLogEvent) -> Result<()>;

    async fn finalize(&self, _summary: RunLogSummary) -> Result<()> {
        Ok(())
    }
}

/// Discards every event. Used when `AgentConfig::enable_logging` is false.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpRunLogSink;

#[async_trait]
impl RunLogSink for NoOpRunLogSink {
    async fn write(&self, _event: RunLogEvent) -> Result<()> {
        Ok(())
    }
}

/// Collects events in memory, keyed by run id. Stands in for a key-value
/// store sink in tests and for in-process callers that don't need
/// cross-process durability.
#[derive(Default)]
pub struct InMemoryRunLogSink {
    events: Mutex<HashMap<Uuid, Vec<RunLogEvent>>>,
    summaries: Mutex<HashMap<Uuid, RunLogSummary>>,
}

impl InMemoryRunLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events_for(&self, run_id: Uuid) -> Vec<RunLogEvent> {
        self.events.lock().await.get(&run_id).cloned().unwrap_or_default()
    }

    pub async fn summary_for(&self, run_id: Uuid) -> Option<RunLogSummary> {
        self.summaries.lock().await.get(&run_id).cloned()
    }
}

#[async_trait]
impl RunLogSink for InMemoryRunLogSink {
    async fn write(&self, event: RunLogEvent) -> Result<()> {
        self.events.lock().await.entry(event.run_id).or_default().push(event);
        Ok(())
    }

    async fn finalize(&self, summary: RunLogSummary) -> Result<()> {
        self.summaries.lock().await.insert(summary.run_id, summary);
        Ok(())
    }
}

/// Append-only JSON-Lines sink: one `<run_id>.jsonl` per run plus a
/// `<run_id>.summary.json` index, atomically replaced on finalize.
pub struct FileRunLogSink {
    log_dir: PathBuf,
}

impl FileRunLogSink {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    fn jsonl_path(&self, run_id: Uuid) -> PathBuf {
        self.log_dir.join(format!("{run_id}.jsonl"))
    }

    fn summary_path(&self, run_id: Uuid) -> PathBuf {
        self.log_dir.join(format!("{run_id}.summary.json"))
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "log.tmp".to_string());
    path.with_file_name(format!("{file_name}.{}.tmp", Uuid::now_v7()))
}

#[async_trait]
impl RunLogSink for FileRunLogSink {
    async fn write(&self, event: RunLogEvent) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        tokio::fs::create_dir_all(&self.log_dir)
            .await
            .map_err(|e| AgentError::run_log(format!("creating log dir: {e}")))?;

        let line = serde_json::to_string(&event)
            .map_err(|e| AgentError::run_log(format!("serializing log event: {e}")))?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.jsonl_path(event.run_id))
            .await
            .map_err(|e| AgentError::run_log(format!("opening log file: {e}")))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| AgentError::run_log(format!("writing log file: {e}")))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| AgentError::run_log(format!("writing log file: {e}")))?;
        Ok(())
    }

    async fn finalize(&self, summary: RunLogSummary) -> Result<()> {
        let path = self.summary_path(summary.run_id);
        let json = serde_json::to_vec_pretty(&summary)
            .map_err(|e| AgentError::run_log(format!("serializing summary: {e}")))?;

        let tmp_path = tmp_path_for(&path);
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| AgentError::run_log(format!("writing temp summary: {e}")))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| AgentError::run_log(format!("replacing summary file: {e}")))?;
        Ok(())
    }
}

/// Per-run event tape. One instance per run; never shared across runs
/// (each holds its own monotonic index counter).
pub struct RunLogger {
    run_id: Uuid,
    sink: Arc<dyn RunLogSink>,
    index: AtomicUsize,
    event_count: AtomicUsize,
    started_at: DateTime<Utc>,
}

impl RunLogger {
    pub fn new(run_id: Uuid, sink: Arc<dyn RunLogSink>) -> Self {
        Self {
            run_id,
            sink,
            index: AtomicUsize::new(0),
            event_count: AtomicUsize::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn noop(run_id: Uuid) -> Self {
        Self::new(run_id, Arc::new(NoOpRunLogSink))
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub async fn log(&self, kind: LogEventKind, payload: impl Serialize) -> Result<()> {
        let payload = truncate_payload(serde_json::to_value(payload).unwrap_or(serde_json::Value::Null));
        let index = self.index.fetch_add(1, Ordering::SeqCst);
        self.event_count.fetch_add(1, Ordering::SeqCst);
        self.sink
            .write(RunLogEvent {
                run_id: self.run_id,
                index,
                timestamp: Utc::now(),
                kind,
                payload,
            })
            .await
    }

    pub async fn finalize(&self, steps: usize, success: bool) -> Result<()> {
        self.sink
            .finalize(RunLogSummary {
                run_id: self.run_id,
                steps,
                success,
                event_count: self.event_count.load(Ordering::SeqCst),
                started_at: self.started_at,
                completed_at: Utc::now(),
            })
            .await
    }
}

/// Truncate large string fields in a JSON payload before they hit the log
/// sink, independent of the untouched content retained in message history.
fn truncate_payload(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) if s.chars().count() > LOG_PAYLOAD_TRUNCATE_CHARS => {
            let truncated: String = s.chars().take(LOG_PAYLOAD_TRUNCATE_CHARS).collect();
            serde_json::Value::String(format!(
                "{truncated}... [truncated, {} chars total]",
                s.chars().count()
            ))
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, truncate_payload(v)))
                .collect(),
        ),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(truncate_payload).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_get_monotonic_indices() {
        let sink = Arc::new(InMemoryRunLogSink::new());
        let run_id = Uuid::now_v7();
        let logger = RunLogger::new(run_id, sink.clone());

        logger.log(LogEventKind::RunStart, serde_json::json!({})).await.unwrap();
        logger.log(LogEventKind::Step, serde_json::json!({"step": 1})).await.unwrap();
        logger.log(LogEventKind::Completion, serde_json::json!({})).await.unwrap();

        let events = sink.events_for(run_id).await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].index, 0);
        assert_eq!(events[2].index, 2);
    }

    #[tokio::test]
    async fn finalize_records_summary() {
        let sink = Arc::new(InMemoryRunLogSink::new());
        let run_id = Uuid::now_v7();
        let logger = RunLogger::new(run_id, sink.clone());
        logger.log(LogEventKind::RunStart, serde_json::json!({})).await.unwrap();
        logger.finalize(3, true).await.unwrap();

        let summary = sink.summary_for(run_id).await.unwrap();
        assert_eq!(summary.steps, 3);
        assert!(summary.success);
        assert_eq!(summary.event_count, 1);
    }

    #[tokio::test]
    async fn large_payload_is_truncated() {
        let sink = Arc::new(InMemoryRunLogSink::new());
        let run_id = Uuid::now_v7();
        let logger = RunLogger::new(run_id, sink.clone());
        let huge = "x".repeat(LOG_PAYLOAD_TRUNCATE_CHARS * 2);

        logger
            .log(LogEventKind::ToolExecution, serde_json::json!({"content": huge}))
            .await
            .unwrap();

        let events = sink.events_for(run_id).await;
        let content = events[0].payload["content"].as_str().unwrap();
        assert!(content.len() < LOG_PAYLOAD_TRUNCATE_CHARS * 2);
        assert!(content.contains("truncated"));
    }

    #[tokio::test]
    async fn file_sink_round_trips() {
        let dir = std::env::temp_dir().join(format!("agentcore-runlog-{}", Uuid::now_v7()));
        let sink = Arc::new(FileRunLogSink::new(&dir));
        let run_id = Uuid::now_v7();
        let logger = RunLogger::new(run_id, sink);

        logger.log(LogEventKind::RunStart, serde_json::json!({})).await.unwrap();
        logger.finalize(1, true).await.unwrap();

        let jsonl = tokio::fs::read_to_string(dir.join(format!("{run_id}.jsonl"))).await.unwrap();
        assert_eq!(jsonl.lines().count(), 1);

        let summary = tokio::fs::read_to_string(dir.join(format!("{run_id}.summary.json"))).await.unwrap();
        assert!(summary.contains("\"steps\": 1"));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}

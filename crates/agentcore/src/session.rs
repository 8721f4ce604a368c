// Session layer: records every agent/team run, renders history back into a
// turn's context, and persists through a pluggable backend.
//
// Writes are serialized per manager with an async mutex; file-backed storage
// uses atomic replace (temp file + rename) so a crash mid-write never leaves
// a torn session file on disk.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AgentError, Result};

/// Who produced a given `RunRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerType {
    /// A standalone agent run (no team involved).
    Agent,
    /// The leader agent of a team turn.
    TeamLeader,
    /// A member agent run, delegated to by a leader.
    Member,
    /// A task executed as part of a dependency-graph run.
    TeamDependency,
}

/// One completed (or failed) run, appended to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    /// Set for team member/dependency runs; resolves to a leader record in
    /// the same session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<Uuid>,
    pub runner_type: RunnerType,
    pub runner_name: String,
    pub task: String,
    pub response: String,
    pub success: bool,
    pub steps: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl RunRecord {
    pub fn new(
        runner_type: RunnerType,
        runner_name: impl Into<String>,
        task: impl Into<String>,
        response: impl Into<String>,
        success: bool,
        steps: usize,
    ) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            parent_run_id: None,
            runner_type,
            runner_name: runner_name.into(),
            task: task.into(),
            response: response.into(),
            success,
            steps,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Override the generated `run_id`. Used when a run's id must be known
    /// before the record is built (e.g. a team leader run, whose id is
    /// minted up front so delegated member records can link to it).
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_parent(mut self, parent_run_id: Uuid) -> Self {
        self.parent_run_id = Some(parent_run_id);
        self
    }
}

/// An append-only record of runs for one conversation/session, plus a small
/// free-form state map carried across turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub owner_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub runs: Vec<RunRecord>,
    #[serde(default)]
    pub state: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(owner_name: impl Into<String>, user_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::now_v7(),
            owner_name: owner_name.into(),
            user_id,
            runs: Vec::new(),
            state: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Render the last `num_runs` runs as alternating user/assistant
    /// messages for injection into a fresh step-loop turn.
    ///
    /// When `smart_compress` is set and a response exceeds
    /// `max_response_chars`, keep the first 70% and last 20% of the budget,
    /// joined by an omission marker.
    pub fn history_messages(
        &self,
        num_runs: usize,
        max_response_chars: usize,
        smart_compress: bool,
    ) -> Vec<crate::message::Message> {
        let mut out = Vec::new();
        for run in self.runs.iter().rev().take(num_runs).collect::<Vec<_>>().into_iter().rev() {
            out.push(crate::message::Message::user(run.task.clone()));
            let response = if smart_compress && run.response.chars().count() > max_response_chars {
                smart_truncate(&run.response, max_response_chars)
            } else {
                run.response.clone()
            };
            out.push(crate::message::Message::assistant(response));
        }
        out
    }

    /// Render history as an XML-tagged text block for system-prompt
    /// injection. `leader_only` restricts to `TeamLeader`/`Agent` runs,
    /// filtering out member/dependency noise.
    pub fn history_context(
        &self,
        num_runs: usize,
        max_response_chars: usize,
        leader_only: bool,
        tag: &str,
    ) -> String {
        let runs: Vec<&RunRecord> = self
            .runs
            .iter()
            .filter(|r| {
                !leader_only
                    || matches!(r.runner_type, RunnerType::TeamLeader | RunnerType::Agent)
            })
            .collect();

        let selected: Vec<&&RunRecord> = runs.iter().rev().take(num_runs).collect::<Vec<_>>();
        let selected: Vec<&&RunRecord> = selected.into_iter().rev().collect();

        if selected.is_empty() {
            return String::new();
        }

        let mut body = String::new();
        for run in selected {
            let response = if run.response.chars().count() > max_response_chars {
                smart_truncate(&run.response, max_response_chars)
            } else {
                run.response.clone()
            };
            body.push_str(&format!("User: {}\nAssistant: {}\n\n", run.task, response));
        }

        format!("<{tag}>\n{}</{tag}>", body)
    }
}

fn smart_truncate(text: &str, budget: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= budget {
        return text.to_string();
    }
    let head_len = (budget as f64 * 0.7) as usize;
    let tail_len = (budget as f64 * 0.2) as usize;
    let head: String = chars[..head_len].iter().collect();
    let tail: String = chars[chars.len() - tail_len..].iter().collect();
    let omitted = chars.len() - head_len - tail_len;
    format!("{head}\n[... 中间内容已省略，共 {omitted} 字符 ...]\n{tail}")
}

/// Pluggable session storage, identical async API across backends.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Append a run to a session, creating the session if it doesn't exist.
    /// Returns the (possibly newly created) session id.
    async fn add_run(
        &self,
        session_id: Option<Uuid>,
        owner_name: &str,
        user_id: Option<&str>,
        run: RunRecord,
    ) -> Result<Uuid>;

    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>>;

    async fn list_sessions(&self) -> Result<Vec<Uuid>>;

    async fn delete_session(&self, session_id: Uuid) -> Result<()>;

    /// Retain only the last `max_runs` records for a session.
    async fn trim_session_runs(&self, session_id: Uuid, max_runs: usize) -> Result<()>;

    /// Delete sessions whose `updated_at` is older than `max_age_days`.
    async fn cleanup_old_sessions(&self, max_age_days: i64) -> Result<usize>;
}

/// In-memory `SessionManager`. First-class (not test-only): usable directly
/// by any caller that doesn't need cross-process persistence.
#[derive(Default)]
pub struct InMemorySessionManager {
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl InMemorySessionManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionManager for InMemorySessionManager {
    async fn add_run(
        &self,
        session_id: Option<Uuid>,
        owner_name: &str,
        user_id: Option<&str>,
        run: RunRecord,
    ) -> Result<Uuid> {
        let mut sessions = self.sessions.lock().await;
        let id = match session_id {
            Some(id) if sessions.contains_key(&id) => id,
            Some(id) => {
                sessions.insert(id, Session::new(owner_name, user_id.map(str::to_string)));
                id
            }
            None => {
                let session = Session::new(owner_name, user_id.map(str::to_string));
                let id = session.session_id;
                sessions.insert(id, session);
                id
            }
        };

        let session = sessions.get_mut(&id).expect("just inserted or verified present");
        session.runs.push(run);
        session.touch();
        Ok(id)
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>> {
        Ok(self.sessions.lock().await.get(&session_id).cloned())
    }

    async fn list_sessions(&self) -> Result<Vec<Uuid>> {
        Ok(self.sessions.lock().await.keys().copied().collect())
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<()> {
        self.sessions.lock().await.remove(&session_id);
        Ok(())
    }

    async fn trim_session_runs(&self, session_id: Uuid, max_runs: usize) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(&session_id) {
            if session.runs.len() > max_runs {
                let drop_count = session.runs.len() - max_runs;
                session.runs.drain(0..drop_count);
            }
            session.touch();
        }
        Ok(())
    }

    async fn cleanup_old_sessions(&self, max_age_days: i64) -> Result<usize> {
        let cutoff = Utc::now() - ChronoDuration::days(max_age_days);
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.updated_at >= cutoff);
        Ok(before - sessions.len())
    }
}

/// File-backed `SessionManager`: a single JSON map of session_id -> Session,
/// atomically replaced on every write.
pub struct FileSessionManager {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSessionManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<HashMap<Uuid, Session>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                if bytes.is_empty() {
                    return Ok(HashMap::new());
                }
                serde_json::from_slice(&bytes)
                    .map_err(|e| AgentError::session(format!("corrupt session file: {e}")))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(AgentError::session(format!("reading session file: {e}"))),
        }
    }

    /// Serialize then atomically replace: write to a sibling temp file and
    /// rename over the target, so a crash mid-write never corrupts the
    /// previous committed state.
    async fn write_all(&self, sessions: &HashMap<Uuid, Session>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AgentError::session(format!("creating session dir: {e}")))?;
        }

        let json = serde_json::to_vec_pretty(sessions)
            .map_err(|e| AgentError::session(format!("serializing sessions: {e}")))?;

        let tmp_path = tmp_path_for(&self.path);
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| AgentError::session(format!("writing temp session file: {e}")))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| AgentError::session(format!("replacing session file: {e}")))?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "sessions.json".to_string());
    path.with_file_name(format!("{file_name}.{}.tmp", Uuid::now_v7()))
}

#[async_trait]
impl SessionManager for FileSessionManager {
    async fn add_run(
        &self,
        session_id: Option<Uuid>,
        owner_name: &str,
        user_id: Option<&str>,
        run: RunRecord,
    ) -> Result<Uuid> {
        let _guard = self.write_lock.lock().await;
        let mut sessions = self.read_all().await?;

        let id = match session_id {
            Some(id) if sessions.contains_key(&id) => id,
            Some(id) => {
                sessions.insert(id, Session::new(owner_name, user_id.map(str::to_string)));
                id
            }
            None => {
                let session = Session::new(owner_name, user_id.map(str::to_string));
                let id = session.session_id;
                sessions.insert(id, session);
                id
            }
        };

        let session = sessions.get_mut(&id).expect("just inserted or verified present");
        session.runs.push(run);
        session.touch();

        self.write_all(&sessions).await?;
        Ok(id)
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>> {
        Ok(self.read_all().await?.remove(&session_id))
    }

    async fn list_sessions(&self) -> Result<Vec<Uuid>> {
        Ok(self.read_all().await?.keys().copied().collect())
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut sessions = self.read_all().await?;
        sessions.remove(&session_id);
        self.write_all(&sessions).await
    }

    async fn trim_session_runs(&self, session_id: Uuid, max_runs: usize) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut sessions = self.read_all().await?;
        if let Some(session) = sessions.get_mut(&session_id) {
            if session.runs.len() > max_runs {
                let drop_count = session.runs.len() - max_runs;
                session.runs.drain(0..drop_count);
            }
            session.touch();
        }
        self.write_all(&sessions).await
    }

    async fn cleanup_old_sessions(&self, max_age_days: i64) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut sessions = self.read_all().await?;
        let cutoff = Utc::now() - ChronoDuration::days(max_age_days);
        let before = sessions.len();
        sessions.retain(|_, session| session.updated_at >= cutoff);
        let removed = before - sessions.len();
        self.write_all(&sessions).await?;
        Ok(removed)
    }
}

/// Shared handle type used by callers that want a single manager instance
/// behind an `Arc`, regardless of backend.
pub type SharedSessionManager = Arc<dyn SessionManager>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_add_run_creates_session() {
        let manager = InMemorySessionManager::new();
        let run = RunRecord::new(RunnerType::Agent, "agent", "task", "response", true, 1);
        let id = manager.add_run(None, "agent", None, run).await.unwrap();

        let session = manager.get_session(id).await.unwrap().unwrap();
        assert_eq!(session.runs.len(), 1);
    }

    #[tokio::test]
    async fn updated_at_is_monotonic() {
        let manager = InMemorySessionManager::new();
        let run1 = RunRecord::new(RunnerType::Agent, "agent", "t1", "r1", true, 1);
        let id = manager.add_run(None, "agent", None, run1).await.unwrap();
        let first = manager.get_session(id).await.unwrap().unwrap().updated_at;

        let run2 = RunRecord::new(RunnerType::Agent, "agent", "t2", "r2", true, 1);
        manager.add_run(Some(id), "agent", None, run2).await.unwrap();
        let second = manager.get_session(id).await.unwrap().unwrap().updated_at;

        assert!(second >= first);
    }

    #[tokio::test]
    async fn trim_keeps_only_last_n_runs() {
        let manager = InMemorySessionManager::new();
        let mut id = None;
        for i in 0..5 {
            let run = RunRecord::new(RunnerType::Agent, "agent", format!("t{i}"), "r", true, 1);
            id = Some(manager.add_run(id, "agent", None, run).await.unwrap());
        }
        let id = id.unwrap();
        manager.trim_session_runs(id, 2).await.unwrap();

        let session = manager.get_session(id).await.unwrap().unwrap();
        assert_eq!(session.runs.len(), 2);
        assert_eq!(session.runs[0].task, "t3");
    }

    #[tokio::test]
    async fn file_backend_round_trips_through_atomic_replace() {
        let dir = std::env::temp_dir().join(format!("agentcore-test-{}", Uuid::now_v7()));
        let manager = FileSessionManager::new(dir.join("agent_sessions.json"));

        let run = RunRecord::new(RunnerType::Agent, "agent", "task", "response", true, 2);
        let id = manager.add_run(None, "agent", None, run).await.unwrap();

        let session = manager.get_session(id).await.unwrap().unwrap();
        assert_eq!(session.runs.len(), 1);
        assert_eq!(session.runs[0].response, "response");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn history_messages_renders_alternating_turns() {
        let mut session = Session::new("agent", None);
        session.runs.push(RunRecord::new(
            RunnerType::Agent,
            "agent",
            "hi",
            "hello",
            true,
            1,
        ));

        let messages = session.history_messages(5, 1000, true);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, crate::message::MessageRole::User);
        assert_eq!(messages[1].role, crate::message::MessageRole::Assistant);
    }

    #[test]
    fn history_context_filters_to_leader_runs() {
        let mut session = Session::new("team", None);
        session.runs.push(RunRecord::new(
            RunnerType::TeamLeader,
            "leader",
            "task",
            "leader response",
            true,
            3,
        ));
        session.runs.push(RunRecord::new(
            RunnerType::Member,
            "member-a",
            "subtask",
            "member response",
            true,
            2,
        ));

        let context = session.history_context(5, 1000, true, "team_history");
        assert!(context.contains("leader response"));
        assert!(!context.contains("member response"));
    }
}

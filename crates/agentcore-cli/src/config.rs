// Environment-driven CLI configuration. Loaded once at startup after
// `dotenvy::dotenv()` has had a chance to populate the process environment
// from a local `.env` file.

use std::sync::Arc;

use agentcore::{FileSessionManager, InMemorySessionManager, SessionManager};
use anyhow::{bail, Context, Result};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Which backend `SessionManager` to construct, selected by
/// `AGENTCORE_SESSION_BACKEND` (default: `memory`).
#[derive(Debug, Clone)]
pub enum SessionBackend {
    Memory,
    File(String),
    Postgres(String),
}

impl SessionBackend {
    fn from_env() -> Result<Self> {
        match env_or("AGENTCORE_SESSION_BACKEND", "memory").as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File(env_or("AGENTCORE_SESSION_FILE", "./agentcore-sessions.json"))),
            "postgres" => {
                let url = std::env::var("DATABASE_URL")
                    .context("AGENTCORE_SESSION_BACKEND=postgres requires DATABASE_URL")?;
                Ok(Self::Postgres(url))
            }
            other => bail!("unknown AGENTCORE_SESSION_BACKEND '{other}' (expected memory, file, or postgres)"),
        }
    }

    pub async fn build(&self) -> Result<Arc<dyn SessionManager>> {
        match self {
            Self::Memory => Ok(Arc::new(InMemorySessionManager::new())),
            Self::File(path) => Ok(Arc::new(FileSessionManager::new(path.clone()))),
            Self::Postgres(url) => {
                let db = agentcore_storage::Database::from_url(url)
                    .await
                    .context("failed to connect to Postgres session backend")?;
                Ok(Arc::new(agentcore_storage::PgSessionManager::new(db)))
            }
        }
    }
}

/// Process-wide settings resolved from the environment.
pub struct AppConfig {
    pub model: String,
    pub workspace_dir: String,
    pub max_steps: usize,
    pub session_backend: SessionBackend,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let max_steps = env_or("AGENTCORE_MAX_STEPS", "50")
            .parse()
            .context("AGENTCORE_MAX_STEPS must be a positive integer")?;

        Ok(Self {
            model: env_or("AGENTCORE_MODEL", "gpt-4o-mini"),
            workspace_dir: env_or("AGENTCORE_WORKSPACE_DIR", "./workspace"),
            max_steps,
            session_backend: SessionBackend::from_env()?,
        })
    }
}

// Postgres storage layer with sqlx: a SessionManager and RunLogSink backed
// by a real database, for callers that need cross-process durability beyond
// the in-memory/file backends in `agentcore::session`.

pub mod models;
pub mod pg_run_log;
pub mod pg_session;
pub mod repositories;

pub use models::*;
pub use pg_run_log::PgRunLogSink;
pub use pg_session::PgSessionManager;
pub use repositories::*;

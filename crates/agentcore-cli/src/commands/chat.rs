use std::io::Write;
use std::sync::Arc;

use agentcore::{RunLogger, RunRecord, RunnerType, SessionManager};
use anyhow::Result;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::runtime;

/// Interactive REPL: each line is a turn, replayed through the same
/// session so later turns see prior history. Exits on EOF or "exit"/"quit".
pub async fn run(session_id: Option<Uuid>, config: &AppConfig) -> Result<()> {
    let llm = runtime::build_llm()?;
    let log_sink = runtime::build_log_sink();
    let tools = runtime::build_tools();
    let agent = runtime::build_agent(config, llm, tools);
    let sessions: Arc<dyn SessionManager> = config.session_backend.build().await?;

    let mut session_id = session_id;
    println!("agentcore chat -- model {}. Type 'exit' to quit.", config.model);

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let history = match session_id {
            Some(id) => sessions
                .get_session(id)
                .await?
                .map(|s| s.history_messages(20, 4_000, true))
                .unwrap_or_default(),
            None => Vec::new(),
        };

        let run_id = Uuid::now_v7();
        let logger = RunLogger::new(run_id, log_sink.clone());
        let outcome = agent.run(line, history, &logger).await?;

        let record = RunRecord::new(
            RunnerType::Agent,
            agent.name(),
            line,
            outcome.content.clone(),
            outcome.success(),
            outcome.steps,
        );
        session_id = Some(sessions.add_run(session_id, agent.name(), None, record).await?);

        println!("{}", outcome.content);
    }

    if let Some(id) = session_id {
        println!("(session {id})");
    }

    Ok(())
}

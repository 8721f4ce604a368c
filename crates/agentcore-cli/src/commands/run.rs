use std::sync::Arc;

use agentcore::{RunLogger, RunRecord, RunnerType, SessionManager};
use anyhow::Result;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::output::{print_field, OutputFormat};
use crate::runtime;

pub async fn run(
    task: String,
    session_id: Option<Uuid>,
    quiet: bool,
    output: OutputFormat,
    config: &AppConfig,
) -> Result<()> {
    let llm = runtime::build_llm()?;
    let log_sink = runtime::build_log_sink();
    let tools = runtime::build_tools();
    let agent = runtime::build_agent(config, llm, tools);

    let sessions: Arc<dyn SessionManager> = config.session_backend.build().await?;
    let history = match session_id {
        Some(id) => sessions
            .get_session(id)
            .await?
            .map(|s| s.history_messages(20, 4_000, true))
            .unwrap_or_default(),
        None => Vec::new(),
    };

    let run_id = Uuid::now_v7();
    let logger = RunLogger::new(run_id, log_sink);
    let outcome = agent.run(&task, history, &logger).await?;

    let record = RunRecord::new(
        RunnerType::Agent,
        agent.name(),
        task.clone(),
        outcome.content.clone(),
        outcome.success(),
        outcome.steps,
    );
    let final_session_id = sessions.add_run(session_id, agent.name(), None, record).await?;

    if !output.is_text() {
        #[derive(serde::Serialize)]
        struct RunResult {
            session_id: Uuid,
            success: bool,
            steps: usize,
            content: String,
        }
        output.print_value(&RunResult {
            session_id: final_session_id,
            success: outcome.success(),
            steps: outcome.steps,
            content: outcome.content,
        });
        return Ok(());
    }

    if !quiet {
        print_field("Session", &final_session_id.to_string());
        print_field("Steps", &outcome.steps.to_string());
        print_field("Success", &outcome.success().to_string());
        println!();
    }
    println!("{}", outcome.content);

    Ok(())
}

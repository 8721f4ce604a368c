use agentcore::SessionManager;
use clap::Subcommand;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::output::{print_field, print_table_header, print_table_row, OutputFormat};

#[derive(Subcommand)]
pub enum SessionsCommand {
    /// List known session ids
    List,
    /// Show the runs recorded in one session
    Show {
        session: Uuid,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Delete a session and its recorded runs
    Delete { session: Uuid },
}

pub async fn run(command: SessionsCommand, output: OutputFormat, config: &AppConfig) -> anyhow::Result<()> {
    let sessions = config.session_backend.build().await?;

    match command {
        SessionsCommand::List => {
            let ids = sessions.list_sessions().await?;
            if !output.is_text() {
                output.print_value(&ids);
                return Ok(());
            }
            for id in ids {
                println!("{id}");
            }
        }
        SessionsCommand::Show { session, limit } => {
            let Some(session) = sessions.get_session(session).await? else {
                println!("session not found");
                return Ok(());
            };

            if !output.is_text() {
                output.print_value(&session);
                return Ok(());
            }

            print_field("Session", &session.session_id.to_string());
            print_field("Owner", &session.owner_name);
            print_field("Runs", &session.runs.len().to_string());
            println!();

            print_table_header(&[("RUNNER", 16), ("TYPE", 14), ("SUCCESS", 8), ("STEPS", 6)]);
            for run in session.runs.iter().rev().take(limit).collect::<Vec<_>>().into_iter().rev() {
                print_table_row(&[
                    (run.runner_name.as_str(), 16),
                    (&format!("{:?}", run.runner_type), 14),
                    (&run.success.to_string(), 8),
                    (&run.steps.to_string(), 6),
                ]);
            }
        }
        SessionsCommand::Delete { session } => {
            sessions.delete_session(session).await?;
            println!("deleted session {session}");
        }
    }

    Ok(())
}

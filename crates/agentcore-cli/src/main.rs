// agentcore CLI: a thin binary wiring the agentcore step loop, the OpenAI
// provider adapter, and the session storage backends into a runnable
// command-line harness. No HTTP/SSE transport of its own -- that layer is
// out of scope for the core this binary drives (see root Cargo.toml).
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Support text/json/yaml output formats for scripting.
// Design Decision: Load configuration from the environment via dotenvy.

mod commands;
mod config;
mod output;
mod runtime;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use config::AppConfig;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "agentcore")]
#[command(about = "Run and chat with an agentcore agent from the command line")]
#[command(version)]
pub struct Cli {
    /// Output format
    #[arg(long, short, default_value = "text", value_parser = ["text", "json", "yaml"])]
    pub output: String,

    /// Suppress non-essential output
    #[arg(long, short)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a single task to completion
    Run {
        /// Task text to send
        task: String,

        /// Session ID to append this run to (a new one is created if omitted)
        #[arg(long, short)]
        session: Option<Uuid>,
    },

    /// Start an interactive chat loop
    Chat {
        /// Session ID to continue (a new one is created if omitted)
        #[arg(long, short)]
        session: Option<Uuid>,
    },

    /// Inspect and manage recorded sessions
    Sessions {
        #[command(subcommand)]
        command: commands::sessions::SessionsCommand,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(?path, "loaded .env");
    }
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let output_format = OutputFormat::from_str(&cli.output);
    let config = AppConfig::from_env()?;

    match cli.command {
        Commands::Run { task, session } => {
            commands::run::run(task, session, cli.quiet, output_format, &config).await
        }
        Commands::Chat { session } => commands::chat::run(session, &config).await,
        Commands::Sessions { command } => commands::sessions::run(command, output_format, &config).await,
    }
}

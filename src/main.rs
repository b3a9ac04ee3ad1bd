//! nlsql command-line entry point

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nlsql_llm::LlmProvider;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use nlsql::services::QueryRequest;
use nlsql::state::{AppState, QueryOverrides};

#[derive(Parser, Debug)]
#[command(
    name = "nlsql",
    about = "Ask questions of a SQLite database in plain language",
    version
)]
struct Cli {
    /// Enable debug logging (overrides RUST_LOG and log_level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate a question to SQL, run it and print the result payload
    Ask {
        question: String,

        /// Continue an existing session
        #[arg(long)]
        session: Option<String>,

        /// Database file (defaults to database_path from the config)
        #[arg(long)]
        database: Option<PathBuf>,

        /// Override retry.max_attempts
        #[arg(long)]
        max_attempts: Option<u32>,
    },

    /// Print the schema context introspected from the database
    Schema {
        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// Inspect, check or reset ~/.nlsql/config.json
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Show,
    Reset,
    /// Check that the configured model endpoint is reachable
    Check,
}

fn init_tracing(log_level: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let state = AppState::new();
    state
        .initialize()
        .await
        .context("failed to load configuration")?;
    let config = state.get_config().await?;
    init_tracing(&config.log_level, cli.verbose);

    match cli.command {
        Command::Ask {
            question,
            session,
            database,
            max_attempts,
        } => {
            let service = state
                .query_service(QueryOverrides {
                    database,
                    max_attempts,
                })
                .await?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, cancelling request");
                    on_interrupt.cancel();
                }
            });

            let mut request = QueryRequest::new(question);
            request.session_id = session;
            request.cancel = Some(cancel);

            let response = service.answer(request).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(if response.outcome.ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Schema { database } => {
            let executor = state.open_executor(database).await?;
            let schema = executor.describe_schema().await?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Config {
            action: ConfigAction::Check,
        } => {
            let provider = state.provider().await?;
            let (reachable, report) = match provider.health_check().await {
                Ok(()) => (
                    true,
                    json!({"provider": provider.name(), "model": provider.model(), "reachable": true}),
                ),
                Err(e) => {
                    warn!(error = %e, "model endpoint check failed");
                    (
                        false,
                        json!({
                            "provider": provider.name(),
                            "model": provider.model(),
                            "reachable": false,
                            "error": e.to_string(),
                        }),
                    )
                }
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(if reachable {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Config { action } => {
            let mut config = match action {
                ConfigAction::Reset => state.reset_config().await?,
                _ => config,
            };
            if config.provider.api_key.is_some() {
                config.provider.api_key = Some("********".to_string());
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

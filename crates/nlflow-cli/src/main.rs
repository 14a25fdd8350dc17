//! CLI entry point for nlflow.
//!
//! This binary provides the `nlflow` command: sentence normalization,
//! workflow creation, event-log inspection and an interactive REPL, all on
//! top of one SQLite-backed session.

mod cli;
mod commands;
mod config;
mod repl;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use config::NlflowConfig;
use session::Session;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = NlflowConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    init_tracing(&config.log_level, cli.json_logs);
    debug!(data_dir = %config.data_dir.display(), history_max = config.history_max, "configuration loaded");

    let mut session = Session::open(&config).await?;

    match cli.command {
        Commands::Normalize {
            text,
            lang,
            llm,
            save,
        } => commands::normalize(&mut session, &text, lang.as_deref(), llm, save).await,
        Commands::Create { sentence } => commands::create(&mut session, &sentence).await,
        Commands::Batch { file } => commands::batch(&mut session, &file).await,
        Commands::Execute { action, context } => {
            commands::execute(&mut session, &action, context.as_deref()).await
        }
        Commands::Events { event_type, limit } => {
            commands::events(&session, event_type.as_deref(), limit).await
        }
        Commands::Stats => commands::stats(&session),
        Commands::ReadModel { overview } => commands::read_model(&session, overview),
        Commands::Diagram { workflow } => commands::diagram(&session, workflow.as_deref()),
        Commands::Duplicates => commands::duplicates(&session),
        Commands::Export { format, output } => {
            commands::export(&session, format.into(), output.as_deref())
        }
        Commands::Repl => repl::cmd_repl(session).await,
    }
}

/// Initialize the tracing subscriber.  `RUST_LOG` wins over `default_level`.
fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

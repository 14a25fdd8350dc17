//! CLI argument definitions for nlflow.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// nlflow -- natural-language trigger sentences to event-sourced workflows.
#[derive(Parser)]
#[command(
    name = "nlflow",
    version,
    about = "nlflow -- turn trigger sentences into workflows",
    long_about = "Normalizes free-form \"when X, do Y and Z\" sentences into structured \
                  workflow steps and records them in an event-sourced engine backed by SQLite."
)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, global = true, default_value = crate::config::DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Split a sentence into condition, actions and numeric thresholds.
    Normalize {
        /// The sentence to normalize.
        text: String,

        /// Language hint (pl, en, es, de, fr, it, pt).
        #[arg(long, short)]
        lang: Option<String>,

        /// Ask the configured LLM provider instead of the heuristic tiers.
        #[arg(long)]
        llm: bool,

        /// Record the result as a workflow.
        #[arg(long)]
        save: bool,
    },

    /// Create a workflow from a strict "Gdy X, Y" sentence.
    Create {
        sentence: String,
    },

    /// Create one workflow per sentence found in a text file.
    Batch {
        file: PathBuf,
    },

    /// Record an action execution.
    Execute {
        /// Action name.
        action: String,

        /// Execution context as a JSON object.
        #[arg(long)]
        context: Option<String>,
    },

    /// List stored events, oldest first.
    Events {
        /// Only events of this type (e.g. WorkflowCreated).
        #[arg(long = "type", short)]
        event_type: Option<String>,

        /// Show only the latest N events.
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Event and action statistics.
    Stats,

    /// Dump the read model.
    ReadModel {
        /// Aggregate the read model instead of listing it.
        #[arg(long)]
        overview: bool,
    },

    /// Render workflows as a Mermaid flowchart.
    Diagram {
        /// Render only this workflow id.
        #[arg(long, short)]
        workflow: Option<String>,
    },

    /// Report workflow ids created more than once.
    Duplicates,

    /// Export the current workflows as a versioned document.
    Export {
        #[arg(long, short, value_enum, default_value_t = FormatArg::Json)]
        format: FormatArg,

        /// Write to a file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Interactive session (create / exec / undo / redo / stats / quit).
    Repl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Json,
    Yaml,
}

impl From<FormatArg> for nlflow_engine::ExportFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Json => Self::Json,
            FormatArg::Yaml => Self::Yaml,
        }
    }
}

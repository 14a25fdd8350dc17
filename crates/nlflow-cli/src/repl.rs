//! Subcommand: `nlflow repl` -- interactive session.
//!
//! Each line is one command.  State is saved after every mutation, so
//! quitting (or Ctrl+C) never loses work.

use std::io::{self, Write as _};

use anyhow::Result;
use tracing::info;

use nlflow_intent::NormalizeOptions;

use crate::commands::{diagram_source, parse_context, print_json};
use crate::session::Session;

const HELP: &str = "\
  Commands:
    create <sentence>        Create a workflow from \"Gdy X, Y\"
    normalize <sentence>     Normalize any trigger sentence and save it
    exec <action> [json]     Record an action execution
    undo / redo              Step through history
    stats                    Event statistics
    workflows                Current workflows
    diagram                  Mermaid flowchart
    help                     Show this help
    quit / exit              Leave the session";

/// A parsed REPL line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Create(String),
    Normalize(String),
    Exec { action: String, context: Option<String> },
    Undo,
    Redo,
    Stats,
    Workflows,
    Diagram,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

/// Parse one input line.  `exec` takes the action name up to the first
/// `{`; the rest is the JSON context.
pub fn parse_line(line: &str) -> ReplCommand {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((h, r)) => (h, r.trim()),
        None => (line, ""),
    };

    match head.to_ascii_lowercase().as_str() {
        "" => ReplCommand::Empty,
        "create" if !rest.is_empty() => ReplCommand::Create(rest.to_owned()),
        "normalize" if !rest.is_empty() => ReplCommand::Normalize(rest.to_owned()),
        "exec" if !rest.is_empty() => match rest.find('{') {
            Some(i) => ReplCommand::Exec {
                action: rest[..i].trim().to_owned(),
                context: Some(rest[i..].to_owned()),
            },
            None => ReplCommand::Exec {
                action: rest.to_owned(),
                context: None,
            },
        },
        "undo" => ReplCommand::Undo,
        "redo" => ReplCommand::Redo,
        "stats" => ReplCommand::Stats,
        "workflows" => ReplCommand::Workflows,
        "diagram" => ReplCommand::Diagram,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        _ => ReplCommand::Unknown(line.to_owned()),
    }
}

pub async fn cmd_repl(mut session: Session) -> Result<()> {
    println!();
    println!("  nlflow v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "  {} events, {} workflows loaded",
        session.engine().event_count(),
        session.engine().workflows().len()
    );
    println!("  Type 'help' for commands, 'quit' to exit.");
    println!();

    let stdin = io::stdin();
    let mut line_buf = String::new();

    loop {
        print!("> ");
        io::stdout().flush().ok();

        line_buf.clear();
        match stdin.read_line(&mut line_buf) {
            Ok(0) => {
                println!();
                info!("EOF received, exiting");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("  Error reading input: {e}");
                continue;
            }
        }

        let command = parse_line(&line_buf);
        if command == ReplCommand::Quit {
            info!("user requested exit");
            break;
        }
        if let Err(e) = run(&mut session, command).await {
            eprintln!("  Error: {e:#}");
        }
    }

    info!("shutting down");
    Ok(())
}

async fn run(session: &mut Session, command: ReplCommand) -> Result<()> {
    match command {
        ReplCommand::Create(sentence) => {
            let created = session.create(&sentence).await?;
            println!(
                "  Created {} [{}] with {} action(s)",
                created.step.id,
                created.step.module,
                created.step.actions.len()
            );
        }
        ReplCommand::Normalize(text) => {
            let outcome = session
                .normalize(&text, &NormalizeOptions::default(), false)
                .await?;
            let created = session.record_outcome(&outcome).await?;
            println!(
                "  {} -> {} (tier {:?}, {} numeric condition(s))",
                outcome.normalized.condition,
                created.step.id,
                outcome.tier,
                outcome.normalized.numeric_conditions.len()
            );
        }
        ReplCommand::Exec { action, context } => {
            let context = parse_context(context.as_deref())?;
            let result = session.execute(&action, context).await?;
            println!("  Recorded {action} ({} event)", result.events_generated);
        }
        ReplCommand::Undo => {
            if session.undo().await? {
                println!(
                    "  Undone ({} events{})",
                    session.engine().event_count(),
                    if session.can_undo() { "" } else { ", at oldest state" }
                );
            } else {
                println!("  Nothing to undo");
            }
        }
        ReplCommand::Redo => {
            if session.redo().await? {
                println!(
                    "  Redone ({} events{})",
                    session.engine().event_count(),
                    if session.can_redo() { "" } else { ", at newest state" }
                );
            } else {
                println!("  Nothing to redo");
            }
        }
        ReplCommand::Stats => print_json(&session.engine().statistics())?,
        ReplCommand::Workflows => {
            for step in session.engine().workflows() {
                println!("  {} [{}] {}", step.id, step.module, step.action_names().join(", "));
            }
        }
        ReplCommand::Diagram => println!("{}", diagram_source(session, None)?),
        ReplCommand::Help => println!("{HELP}"),
        ReplCommand::Empty | ReplCommand::Quit => {}
        ReplCommand::Unknown(line) => {
            println!("  Unknown command: {line}. Try 'help'.");
        }
    }
    Ok(())
}

//! One-shot subcommands.  Structured results go to stdout as pretty JSON;
//! hints and warnings go to stderr.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::{Map, Value};

use nlflow_engine::projections::overview;
use nlflow_engine::serializer::export_workflow;
use nlflow_engine::validator::validate_definition;
use nlflow_engine::{ExportFormat, find_duplicate_workflows, render_mermaid};
use nlflow_intent::{Lang, NormalizeOptions};
use nlflow_kernel::WorkflowDefinition;

use crate::session::Session;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse `--context`.  Anything but a JSON object is rejected.
pub fn parse_context(raw: Option<&str>) -> Result<Value> {
    let Some(raw) = raw else {
        return Ok(Value::Object(Map::new()));
    };
    let value: Value = serde_json::from_str(raw).context("--context is not valid JSON")?;
    if !value.is_object() {
        bail!("--context must be a JSON object");
    }
    Ok(value)
}

pub async fn normalize(
    session: &mut Session,
    text: &str,
    lang: Option<&str>,
    llm: bool,
    save: bool,
) -> Result<()> {
    let options = NormalizeOptions {
        lang: lang.map(|l| l.parse::<Lang>().unwrap_or_default()),
        ..NormalizeOptions::default()
    };
    let outcome = session.normalize(text, &options, llm).await?;
    print_json(&outcome)?;

    if save {
        let created = session.record_outcome(&outcome).await?;
        eprintln!("  Saved workflow {} ({})", created.step.id, created.step.module);
        if !created.persisted {
            eprintln!("  Warning: workflow was not written to the database");
        }
    }
    Ok(())
}

pub async fn create(session: &mut Session, sentence: &str) -> Result<()> {
    let created = session.create(sentence).await?;
    print_json(&created)
}

pub async fn batch(session: &mut Session, file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let report = session.batch(&text).await?;
    print_json(&report)?;
    if report.created.is_empty() && report.failed.is_empty() {
        eprintln!("  No \"Gdy X, Y\" sentences found in {}", file.display());
    }
    Ok(())
}

pub async fn execute(session: &mut Session, action: &str, context: Option<&str>) -> Result<()> {
    let context = parse_context(context)?;
    let result = session.execute(action, context).await?;
    print_json(&result)
}

pub async fn events(session: &Session, event_type: Option<&str>, limit: Option<usize>) -> Result<()> {
    let events = session.stored_events(event_type, limit).await?;
    print_json(&events)
}

pub fn stats(session: &Session) -> Result<()> {
    print_json(&session.engine().statistics())
}

pub fn read_model(session: &Session, with_overview: bool) -> Result<()> {
    let engine = session.engine();
    if with_overview {
        print_json(&overview(&engine.events(), &engine.read_model()))
    } else {
        print_json(&engine.read_model())
    }
}

/// Mermaid source for every workflow, or only `workflow_id`.
pub fn diagram_source(session: &Session, workflow_id: Option<&str>) -> Result<String> {
    let engine = session.engine();
    let definition = match workflow_id {
        Some(id) => match engine.workflows().into_iter().find(|s| s.id == id) {
            Some(step) => WorkflowDefinition::from(step),
            None => bail!("unknown workflow `{id}`"),
        },
        None => engine.workflow_definition(),
    };

    for problem in validate_definition(&definition) {
        eprintln!("  Warning: {problem}");
    }
    Ok(render_mermaid(&definition, engine.sanitizer()))
}

pub fn diagram(session: &Session, workflow_id: Option<&str>) -> Result<()> {
    println!("{}", diagram_source(session, workflow_id)?);
    Ok(())
}

pub fn duplicates(session: &Session) -> Result<()> {
    print_json(&find_duplicate_workflows(&session.engine().workflow_payloads()))
}

pub fn export(session: &Session, format: ExportFormat, output: Option<&Path>) -> Result<()> {
    let document = export_workflow(&session.engine().workflow_definition(), format)?;
    match output {
        Some(path) => {
            std::fs::write(path, &document)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("  Exported {format} to {}", path.display());
        }
        None => println!("{document}"),
    }
    Ok(())
}

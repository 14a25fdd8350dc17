//! Workflow documents in JSON and YAML.
//!
//! A document wraps a workflow payload with the format version it was
//! written in: `{version, workflow}`.  Imports run through
//! [`migrate_workflow`] so older or bare payloads are upgraded first.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{EngineError, Result};

/// Version written into every exported document.
pub const WORKFLOW_FORMAT_VERSION: &str = "1.0.0";

/// Highest major version this build can read.
const SUPPORTED_MAJOR: u64 = 1;

/// On-disk document shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDocument {
    pub version: String,
    pub workflow: Value,
}

/// Export format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Yaml,
}

impl FromStr for ExportFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(EngineError::WorkflowImport {
                reason: format!("unknown format `{other}` (expected json or yaml)"),
            }),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        })
    }
}

fn document<T: Serialize>(workflow: &T) -> Result<WorkflowDocument> {
    Ok(WorkflowDocument {
        version: WORKFLOW_FORMAT_VERSION.to_owned(),
        workflow: serde_json::to_value(workflow)?,
    })
}

/// Pretty-printed JSON document.
pub fn export_workflow_json<T: Serialize>(workflow: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(&document(workflow)?)?)
}

pub fn export_workflow_yaml<T: Serialize>(workflow: &T) -> Result<String> {
    Ok(serde_yaml::to_string(&document(workflow)?)?)
}

pub fn export_workflow<T: Serialize>(workflow: &T, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => export_workflow_json(workflow),
        ExportFormat::Yaml => export_workflow_yaml(workflow),
    }
}

/// Read a JSON document (or a bare workflow) and return the migrated
/// workflow payload.
pub fn import_workflow_json(text: &str) -> Result<Value> {
    let data: Value = serde_json::from_str(text)?;
    Ok(migrate_workflow(data)?.workflow)
}

pub fn import_workflow_yaml(text: &str) -> Result<Value> {
    let data: Value = serde_yaml::from_str(text)?;
    Ok(migrate_workflow(data)?.workflow)
}

/// Import and deserialize in one step.
pub fn import_workflow<T: DeserializeOwned>(text: &str, format: ExportFormat) -> Result<T> {
    let workflow = match format {
        ExportFormat::Json => import_workflow_json(text)?,
        ExportFormat::Yaml => import_workflow_yaml(text)?,
    };
    Ok(serde_json::from_value(workflow)?)
}

/// Upgrade a document to the current format version.
///
/// A missing `version` means `1.0.0`.  A payload without a `workflow` key is
/// treated as the workflow itself.  Documents from a newer major version are
/// rejected.
pub fn migrate_workflow(data: Value) -> Result<WorkflowDocument> {
    if data.is_null() {
        return Err(EngineError::WorkflowImport {
            reason: "no data".into(),
        });
    }

    let version = data
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or(WORKFLOW_FORMAT_VERSION)
        .to_owned();
    let major = version
        .split('.')
        .next()
        .and_then(|m| m.parse::<u64>().ok())
        .ok_or_else(|| EngineError::WorkflowImport {
            reason: format!("malformed version `{version}`"),
        })?;
    if major > SUPPORTED_MAJOR {
        return Err(EngineError::WorkflowImport {
            reason: format!("document version {version} is newer than {WORKFLOW_FORMAT_VERSION}"),
        });
    }

    let workflow = match data {
        Value::Object(mut map) if map.contains_key("workflow") => {
            map.remove("workflow").unwrap_or(Value::Null)
        }
        other => other,
    };
    debug!(from = %version, to = WORKFLOW_FORMAT_VERSION, "workflow document migrated");

    Ok(WorkflowDocument {
        version: WORKFLOW_FORMAT_VERSION.to_owned(),
        workflow,
    })
}

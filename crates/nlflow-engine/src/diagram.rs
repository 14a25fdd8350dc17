//! Mermaid flowchart rendering.
//!
//! Steps are grouped into one subgraph per module, in first-seen module
//! order.  Each step node links to its action nodes.

use std::fmt::Write;

use serde_json::Value;

use nlflow_kernel::{DEFAULT_MODULE, Step, TextSanitizer, WorkflowDefinition};

/// Rendered instead of a chart when the input has no `steps` array.
pub const INVALID_WORKFLOW_DIAGRAM: &str = "flowchart TD\n    Error[\"Invalid workflow\"]";

const CLASS_DEF: &str = "classDef action-node fill:#f9f,stroke:#333,stroke-width:1px;\n";

/// Render a workflow definition as a Mermaid `flowchart TD`.
pub fn render_mermaid(definition: &WorkflowDefinition, sanitizer: &TextSanitizer) -> String {
    let mut groups: Vec<(&str, Vec<&Step>)> = Vec::new();
    for step in &definition.steps {
        let module = if step.module.is_empty() {
            DEFAULT_MODULE
        } else {
            step.module.as_str()
        };
        match groups.iter_mut().find(|(m, _)| *m == module) {
            Some((_, steps)) => steps.push(step),
            None => groups.push((module, vec![step])),
        }
    }

    let mut code = String::from("flowchart TD\n");
    // Writing into a String cannot fail.
    for (module, steps) in groups {
        let _ = writeln!(code, "    subgraph {}[{module}]", sanitizer.sanitize_id(module));
        for step in steps {
            let step_id = sanitizer.sanitize_id(&step.id);
            let _ = writeln!(
                code,
                "        {step_id}[\"{}\"]:::action-node",
                label(&step.name)
            );
            for action in &step.actions {
                let action_id = sanitizer.sanitize_id(&action.id);
                let _ = writeln!(
                    code,
                    "        {action_id}[\"{}\"]:::action-node",
                    label(&action.name)
                );
                let _ = writeln!(code, "        {step_id} --> {action_id}");
            }
        }
        code.push_str("    end\n");
    }
    code.push_str(CLASS_DEF);
    code
}

/// Render untyped input, falling back to the error chart.
pub fn render_mermaid_value(workflow: &Value, sanitizer: &TextSanitizer) -> String {
    if !workflow.get("steps").is_some_and(Value::is_array) {
        return INVALID_WORKFLOW_DIAGRAM.to_owned();
    }
    match serde_json::from_value::<WorkflowDefinition>(workflow.clone()) {
        Ok(definition) => render_mermaid(&definition, sanitizer),
        Err(_) => INVALID_WORKFLOW_DIAGRAM.to_owned(),
    }
}

/// Double quotes would end the Mermaid label early.
fn label(text: &str) -> String {
    text.replace('"', "#quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use nlflow_kernel::ModuleClassifier;
    use serde_json::json;

    fn step(condition: &str, actions: &[&str]) -> Step {
        Step::build(
            condition,
            actions,
            &TextSanitizer::new(),
            &ModuleClassifier::new(),
        )
    }

    #[test]
    fn renders_grouped_subgraphs() {
        let def = WorkflowDefinition {
            steps: vec![
                step("wpłata klienta nastąpi", &["wystaw fakturę"]),
                step("nowy lead", &["dodaj do CRM"]),
            ],
        };
        let code = render_mermaid(&def, &TextSanitizer::new());

        assert!(code.starts_with("flowchart TD\n    subgraph Platnosci[Platnosci]\n"));
        assert!(code.contains(
            "        wplata_klienta_nastapi[\"wpłata klienta nastąpi\"]:::action-node\n"
        ));
        assert!(code.contains("        wplata_klienta_nastapi --> wplata_klienta_nastapi_action_1\n"));
        assert_eq!(code.matches("    end\n").count(), 2);
        assert!(code.ends_with(CLASS_DEF));
    }

    #[test]
    fn same_module_shares_subgraph() {
        let def = WorkflowDefinition {
            steps: vec![step("a", &["x"]), step("b", &["y"])],
        };
        let code = render_mermaid(&def, &TextSanitizer::new());
        assert_eq!(code.matches("subgraph Default[Default]").count(), 1);
    }

    #[test]
    fn quotes_are_escaped() {
        let def = WorkflowDefinition::from(step("say \"hi\"", &["x"]));
        let code = render_mermaid(&def, &TextSanitizer::new());
        assert!(code.contains("[\"say #quot;hi#quot;\"]"));
    }

    #[test]
    fn invalid_input_renders_error_chart() {
        let s = TextSanitizer::new();
        assert_eq!(render_mermaid_value(&json!(null), &s), INVALID_WORKFLOW_DIAGRAM);
        assert_eq!(render_mermaid_value(&json!({"steps": 3}), &s), INVALID_WORKFLOW_DIAGRAM);
        assert_eq!(
            render_mermaid_value(&json!({"steps": []}), &s),
            format!("flowchart TD\n{CLASS_DEF}")
        );
    }
}

//! Workflow structures shared by the normalizer, the engine and the store.

use serde::{Deserialize, Serialize};

use crate::classifier::ModuleClassifier;
use crate::sanitizer::TextSanitizer;

/// One instruction extracted from a sentence tail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Stable id derived from the owning step id and the action position.
    pub id: String,
    pub name: String,
    pub module: String,
}

/// A workflow step: one condition and the actions it triggers.
///
/// `id` is derived from the sanitized condition text only, so two sentences
/// with the same condition produce the same id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    /// The condition text.
    pub name: String,
    pub module: String,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Step {
    /// Build a step from a condition and action names.
    ///
    /// The step module is classified from the condition plus every action;
    /// each action is classified on its own.
    pub fn build<S: AsRef<str>>(
        condition: &str,
        actions: &[S],
        sanitizer: &TextSanitizer,
        classifier: &ModuleClassifier,
    ) -> Self {
        let id = sanitizer.sanitize_id(condition);
        let joined = actions
            .iter()
            .map(|a| a.as_ref())
            .collect::<Vec<_>>()
            .join(" ");
        let module = classifier.classify(&format!("{condition} {joined}"));

        let actions = actions
            .iter()
            .enumerate()
            .map(|(i, name)| Action {
                id: sanitizer.sanitize_id(&format!("{id}_action_{}", i + 1)),
                name: name.as_ref().to_owned(),
                module: classifier.classify(name.as_ref()),
            })
            .collect();

        Self {
            id,
            name: condition.to_owned(),
            module,
            actions,
        }
    }

    /// Action names in order.
    pub fn action_names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name.as_str()).collect()
    }
}

/// A workflow made of one or more steps (the unit rendered and validated).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl From<Step> for WorkflowDefinition {
    fn from(step: Step) -> Self {
        Self { steps: vec![step] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_derives_ids_and_modules() {
        let step = Step::build(
            "wpłata klienta nastąpi",
            &["wystaw fakturę", "uruchom kampanię"],
            &TextSanitizer::new(),
            &ModuleClassifier::new(),
        );
        assert_eq!(step.id, "wplata_klienta_nastapi");
        assert_eq!(step.name, "wpłata klienta nastąpi");
        assert_eq!(step.module, "Platnosci");
        assert_eq!(step.actions[0].id, "wplata_klienta_nastapi_action_1");
        assert_eq!(step.actions[0].module, "Finanse");
        assert_eq!(step.actions[1].id, "wplata_klienta_nastapi_action_2");
        assert_eq!(step.actions[1].module, "Reklama");
        assert_eq!(step.action_names(), vec!["wystaw fakturę", "uruchom kampanię"]);
    }
}

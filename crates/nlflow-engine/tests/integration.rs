//! Integration tests for the nlflow-engine crate.
//!
//! These drive the engine the way the CLI does: normalize, create, execute,
//! then inspect the log, read model, history and derived views.

use std::sync::Arc;

use nlflow_engine::event::{ACTION_EXECUTED, COMMAND_FAILED, WORKFLOW_CREATED};
use nlflow_engine::{
    ExportFormat, HistoryManager, ReadModelEntry, WorkflowEngine, WorkflowService,
    find_duplicate_workflows, projections, render_mermaid, serializer, validate_workflow,
};
use nlflow_intent::{NormalizeOptions, SentenceNormalizer};
use nlflow_kernel::{ModuleClassifier, TextSanitizer};
use proptest::prelude::*;
use serde_json::json;

fn parts() -> (Arc<TextSanitizer>, Arc<ModuleClassifier>) {
    (
        Arc::new(TextSanitizer::new()),
        Arc::new(ModuleClassifier::new()),
    )
}

fn engine() -> WorkflowEngine {
    let (s, c) = parts();
    WorkflowEngine::new(s, c).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════
//  Event log and read model
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn log_and_read_model_grow_together() {
    let mut e = engine();
    let sentences = [
        "Gdy wpłata klienta nastąpi, wystaw fakturę i uruchom kampanię",
        "Kiedy nowy lead, dodaj do CRM oraz wyślij email",
    ];
    for s in sentences {
        let before_log = e.event_count();
        let before_rm = e.read_model().len();
        let result = e.create_workflow_from_nlp(s).unwrap();
        assert_eq!(e.event_count(), before_log + result.events_generated);
        assert_eq!(e.read_model().len(), before_rm + result.events_generated);
    }

    e.execute_action("wystaw fakturę", json!({"workflowId": "wplata_klienta_nastapi", "module": "Finanse"}))
        .unwrap();

    assert_eq!(e.events_by_type(WORKFLOW_CREATED).len(), 2);
    assert_eq!(e.events_by_type(ACTION_EXECUTED).len(), 1);
    assert_eq!(e.replay(), e.read_model());

    let statuses = projections::workflow_statuses(&e.read_model());
    assert_eq!(statuses[0].id, "wplata_klienta_nastapi");
    assert_eq!(statuses[0].actions, 1);
    assert_eq!(
        projections::module_action_counts(&e.read_model()).get("Finanse"),
        Some(&1)
    );
}

#[test]
fn invalid_sentence_only_appends_command_failed() {
    let mut e = engine();
    assert!(e.create_workflow_from_nlp("Nieprawidłowe zdanie bez struktury").is_err());
    let types: Vec<_> = e.events().into_iter().map(|ev| ev.event_type).collect();
    assert_eq!(types, vec![COMMAND_FAILED]);
}

#[test]
fn engines_do_not_share_classifier_tables() {
    let sanitizer = Arc::new(TextSanitizer::new());
    let mut custom = ModuleClassifier::new();
    custom.add_module("Serwis", vec!["awaria".into()]).unwrap();

    let mut a = WorkflowEngine::new(Arc::clone(&sanitizer), Arc::new(custom)).unwrap();
    let mut b = WorkflowEngine::new(sanitizer, Arc::new(ModuleClassifier::new())).unwrap();
    a.create_workflow_from_nlp("Gdy awaria drukarki, zgłoś serwis").unwrap();
    b.create_workflow_from_nlp("Gdy awaria drukarki, zgłoś serwis").unwrap();

    let module = |e: &WorkflowEngine| e.workflows()[0].module.clone();
    assert_eq!(module(&a), "Serwis");
    assert_ne!(module(&b), "Serwis");
}

// ═══════════════════════════════════════════════════════════════════════
//  Normalizer → engine
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn normalizer_outcome_becomes_workflow() {
    let (s, c) = parts();
    let normalizer = SentenceNormalizer::new(Arc::clone(&s), Arc::clone(&c)).unwrap();
    let outcome = normalizer
        .normalize(
            "kiedy klient zapłaci wyślij fakturę i powiadom sprzedaż",
            &NormalizeOptions::default(),
        )
        .unwrap();

    let mut svc = WorkflowService::new(WorkflowEngine::new(s, c).unwrap(), 20).unwrap();
    let created = svc.create_from_outcome(&outcome).await.unwrap();
    assert_eq!(created.step, outcome.step);

    match &svc.engine().read_model()[0] {
        ReadModelEntry::Workflow { source, .. } => assert_eq!(source.as_deref(), Some("Normalizer")),
        other => panic!("unexpected entry {other:?}"),
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Export, import and derived artefacts
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn exported_state_survives_json() {
    let mut e = engine();
    e.create_workflow_from_nlp("Gdy klient zapłaci, wyślij fakturę").unwrap();
    e.execute_action("wyślij fakturę", json!({"kwota": 100})).unwrap();

    let text = serde_json::to_string(&e.export_state()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();

    let mut restored = engine();
    assert!(restored.import_state_value(&value));
    assert_eq!(restored.events(), e.events());
    assert_eq!(restored.read_model(), e.read_model());
    assert_eq!(restored.replay(), restored.read_model());
}

#[test]
fn definition_validates_renders_and_exports() {
    let mut e = engine();
    e.create_workflow_from_nlp("Gdy wpłata klienta nastąpi, wystaw fakturę").unwrap();
    e.create_workflow_from_nlp("Gdy nowy lead, dodaj do CRM").unwrap();
    let def = e.workflow_definition();

    assert!(validate_workflow(&serde_json::to_value(&def).unwrap()).is_empty());
    let chart = render_mermaid(&def, e.sanitizer());
    assert!(chart.contains("subgraph Platnosci[Platnosci]"));
    assert!(chart.contains("subgraph CRM[CRM]"));

    let yaml = serializer::export_workflow(&def, ExportFormat::Yaml).unwrap();
    let back: nlflow_kernel::WorkflowDefinition =
        serializer::import_workflow(&yaml, ExportFormat::Yaml).unwrap();
    assert_eq!(back, def);
}

#[test]
fn duplicate_conditions_are_reported() {
    let mut e = engine();
    e.create_workflow_from_nlp("Gdy klient zapłaci, wyślij fakturę").unwrap();
    e.create_workflow_from_nlp("Jeśli klient zapłaci, powiadom sprzedaż").unwrap();

    let report = find_duplicate_workflows(&e.workflow_payloads());
    assert_eq!(report.total, 2);
    assert_eq!(report.unique, 1);
    assert_eq!(report.duplicates[0].id, "klient_zaplaci");
    assert_eq!(e.workflows().len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════
//  History properties
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn history_len_never_exceeds_max(max in 1usize..30, pushes in 0usize..80) {
        let mut h = HistoryManager::new(max);
        for i in 0..pushes {
            h.snapshot(&i);
            prop_assert!(h.len() <= max);
            prop_assert_eq!(h.current(), Some(i));
        }
    }
}

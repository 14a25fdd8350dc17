//! End-to-end normalizer tests over realistic trigger sentences.

use std::sync::Arc;

use nlflow_intent::{Lang, NormalizeOptions, SentenceNormalizer, Tier};
use nlflow_kernel::{ModuleClassifier, TextSanitizer};
use proptest::prelude::*;

fn normalizer() -> SentenceNormalizer {
    SentenceNormalizer::new(
        Arc::new(TextSanitizer::new()),
        Arc::new(ModuleClassifier::new()),
    )
    .unwrap()
}

fn fold(text: &str) -> String {
    TextSanitizer::new().fold(text)
}

// ═══════════════════════════════════════════════════════════════════════
//  Known sentences
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn polish_business_sentences() {
    let n = normalizer();
    let cases = [
        (
            "Gdy termin płatności minie, wyślij ponaglenie i utwórz zadanie w CRM",
            "termin płatności minie",
            vec!["wyślij ponaglenie", "utwórz zadanie w CRM"],
        ),
        (
            "Gdy zgłoszenie serwisowe wpłynie, przypisz je do zespołu i powiadom klienta",
            "zgłoszenie serwisowe wpłynie",
            vec!["przypisz je do zespołu", "powiadom klienta"],
        ),
    ];

    for (sentence, condition, actions) in cases {
        let out = n.normalize(sentence, &NormalizeOptions::default()).unwrap();
        assert_eq!(out.normalized.condition, condition, "{sentence}");
        assert_eq!(out.normalized.actions, actions, "{sentence}");
        assert_eq!(out.step.actions.len(), actions.len());
    }
}

#[test]
fn english_delimited_sentence() {
    let out = normalizer()
        .normalize(
            "If the invoice is overdue: email the customer and notify accounting.",
            &NormalizeOptions::with_lang(Lang::En),
        )
        .unwrap();
    assert_eq!(out.tier, Tier::MarkerVerb);
    assert_eq!(out.normalized.condition, "the invoice is overdue");
    assert_eq!(
        out.normalized.actions,
        vec!["email the customer", "notify accounting"]
    );
}

#[test]
fn scenario_sentences_fold_as_expected() {
    let n = normalizer();

    let out = n
        .normalize(
            "kiedy klient zapłaci wyślij fakturę i powiadom sprzedaż",
            &NormalizeOptions::default(),
        )
        .unwrap();
    assert_eq!(fold(&out.normalized.condition), "klient zaplaci");
    let actions: Vec<String> = out.normalized.actions.iter().map(|a| fold(a)).collect();
    assert_eq!(actions, vec!["wyslij fakture", "powiadom sprzedaz"]);

    let out = n
        .normalize(
            "jesli stan magazynowy ponizej 1 sztuki wyslij email do działu zamowien",
            &NormalizeOptions::default(),
        )
        .unwrap();
    assert_eq!(out.normalized.condition, "stan magazynowy ponizej 1 sztuki");
    assert_eq!(out.normalized.actions, vec!["wyslij email do działu zamowien"]);
    assert_eq!(out.normalized.numeric_conditions[0].unit.as_deref(), Some("pieces"));
}

#[test]
fn outcome_serializes_with_iso_codes() {
    let out = normalizer()
        .normalize("Gdy wpłata nastąpi, wystaw fakturę", &NormalizeOptions::default())
        .unwrap();
    let json = serde_json::to_value(&out).unwrap();
    assert_eq!(json["lang"], "pol");
    assert_eq!(json["tier"], "marker_verb");
    assert_eq!(json["step"]["id"], "wplata_nastapi");
    assert_eq!(json["llm"], false);
}

// ═══════════════════════════════════════════════════════════════════════
//  Robustness
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn any_non_blank_text_normalizes(input in "[a-zA-ZąęłśżĄĘŁŚŻ ,.:-]{1,60}") {
        prop_assume!(!input.trim().is_empty());
        let n = normalizer();
        let out = n.normalize(&input, &NormalizeOptions::default());
        prop_assert!(out.is_ok());
        let out = out.unwrap();
        prop_assert!(!out.step.id.is_empty());
    }
}

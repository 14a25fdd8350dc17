//! Keyword-based module classifier.
//!
//! Maps free text to a business module ("Finanse", "CRM", ...) using a
//! static keyword table:
//!
//! | Step | Technique |
//! |------|-----------|
//! | 1 | Aho-Corasick scan over every keyword, earliest table entry wins |
//! | 2 | Linear substring scan (only when the automaton could not be built) |
//! | 3 | `"Default"` |
//!
//! Each [`ModuleClassifier`] owns its table; engines receive one through
//! their constructor instead of sharing a global.

use aho_corasick::{AhoCorasick, MatchKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

/// Module returned when no keyword matches.
pub const DEFAULT_MODULE: &str = "Default";

/// Built-in keyword table, in priority order.
const BUILTIN_MODULES: &[(&str, &[&str])] = &[
    (
        "Platnosci",
        &[
            "wpłata", "płatność", "payment", "przelew", "karta", "transakcja", "płaci",
            "opłata", "zapłata", "należność", "rozliczenie", "fakturowanie",
        ],
    ),
    (
        "Finanse",
        &[
            "faktura", "fakturę", "invoice", "księgowość", "raport", "finanse", "accounting",
            "wystaw", "wystawić", "księgowanie", "bilans", "rachunek", "kosztorys",
        ],
    ),
    (
        "Reklama",
        &[
            "kampania", "kampanię", "reklama", "marketing", "retargeting", "ads", "uruchom",
            "uruchamianie", "promocja", "advertise", "bannery",
        ],
    ),
    (
        "Marketing",
        &[
            "newsletter", "email", "wiadomość", "powitalny", "promocja", "wyślij", "wysłanie",
            "komunikacja", "mailing", "kampania mailowa", "powiadomienie",
        ],
    ),
    (
        "CRM",
        &[
            "klient", "crm", "kontakt", "customer", "relacje", "dodaj do crm", "dodaj",
            "zarządzanie klientami", "baza klientów", "lead", "prospect",
        ],
    ),
    (
        "eDoręczenia",
        &[
            "doręczenie", "e-doręczenie", "poczta", "mail", "wysłanie",
            "elektroniczne doręczenie", "epuap", "pup",
        ],
    ),
    (
        "Powiadomienia",
        &[
            "powiadom", "notification", "alert", "inform", "komunikat", "zawiadom",
            "poinformuj", "ostrzeż", "przypomnienie",
        ],
    ),
    (
        "Analiza",
        &[
            "analiza", "raport", "dashboard", "statystyki", "metrics", "dane", "analytics",
            "reporting", "zestawienie", "podsumowanie",
        ],
    ),
    (
        "Magazyn",
        &[
            "magazyn", "stock", "inventory", "towar", "produkt", "zapas", "składnica",
            "inwentarz", "stan magazynowy",
        ],
    ),
    (
        "Logistyka",
        &[
            "dostawa", "transport", "wysyłka", "kurier", "shipping", "przesyłka",
            "dystrybucja", "dostarczenie",
        ],
    ),
    (
        "HR",
        &[
            "pracownik", "employee", "kadry", "hr", "human resources", "zatrudnienie",
            "rekrutacja", "zespół",
        ],
    ),
    (
        "Bezpieczeństwo",
        &[
            "security", "bezpieczeństwo", "autoryzacja", "authentication", "login", "hasło",
            "dostęp", "uprawnienia",
        ],
    ),
];

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A module and the keywords that select it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDefinition {
    pub name: String,
    pub keywords: Vec<String>,
}

/// One entry of [`ModuleClassifier::classify_with_confidence`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleMatch {
    pub module: String,
    /// Share of the module's keywords found in the text (0.0 to 1.0).
    pub confidence: f64,
    pub keywords: Vec<String>,
}

/// Outcome of [`ModuleClassifier::validate`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    /// Keywords claimed by more than one module.  Duplicates do not make the
    /// table invalid; the later module owns the keyword.
    pub warnings: Vec<String>,
}

/// Serializable classifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub modules: Vec<ModuleDefinition>,
    #[serde(default)]
    pub metadata: Option<ClassifierConfigMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfigMetadata {
    pub total_modules: usize,
    pub total_keywords: usize,
    pub exported_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ModuleClassifier
// ---------------------------------------------------------------------------

/// Keyword table plus the compiled automaton used to scan it.
///
/// Mutating methods rebuild the automaton eagerly so [`classify`] can stay
/// `&self`.
///
/// [`classify`]: ModuleClassifier::classify
#[derive(Debug, Clone)]
pub struct ModuleClassifier {
    /// Module definitions in priority order.
    modules: Vec<ModuleDefinition>,
    /// Lowercased keyword → owning module, in first-seen order.  A keyword
    /// claimed twice keeps its position but moves to the later module.
    keyword_index: Vec<(String, String)>,
    /// Automaton over `keyword_index` (same pattern order).
    automaton: Option<AhoCorasick>,
}

impl ModuleClassifier {
    /// Create a classifier with the built-in keyword table.
    pub fn new() -> Self {
        let modules = BUILTIN_MODULES
            .iter()
            .map(|(name, keywords)| ModuleDefinition {
                name: (*name).to_owned(),
                keywords: keywords.iter().map(|k| (*k).to_owned()).collect(),
            })
            .collect();
        Self::from_modules(modules)
    }

    /// Create a classifier with no modules; everything maps to `Default`.
    pub fn empty() -> Self {
        Self::from_modules(Vec::new())
    }

    /// Create a classifier from explicit module definitions.
    pub fn from_modules(modules: Vec<ModuleDefinition>) -> Self {
        let mut classifier = Self {
            modules,
            keyword_index: Vec::new(),
            automaton: None,
        };
        classifier.rebuild();
        classifier
    }

    /// Return the module for `text`, or [`DEFAULT_MODULE`].
    ///
    /// Matching is a case-insensitive substring test.  When several keywords
    /// occur, the one registered first in the table decides.
    pub fn classify(&self, text: &str) -> String {
        let lowered = text.trim().to_lowercase();
        if lowered.is_empty() {
            return DEFAULT_MODULE.to_owned();
        }

        if let Some(ac) = &self.automaton {
            let best = ac
                .find_overlapping_iter(&lowered)
                .map(|m| m.pattern().as_usize())
                .min();
            return match best {
                Some(idx) => self.keyword_index[idx].1.clone(),
                None => DEFAULT_MODULE.to_owned(),
            };
        }

        self.keyword_index
            .iter()
            .find(|(keyword, _)| lowered.contains(keyword.as_str()))
            .map(|(_, module)| module.clone())
            .unwrap_or_else(|| DEFAULT_MODULE.to_owned())
    }

    /// Every module with at least one matching keyword, ranked by the share
    /// of its keywords present in `text`.
    pub fn classify_with_confidence(&self, text: &str) -> Vec<ModuleMatch> {
        let lowered = text.trim().to_lowercase();
        let default = || {
            vec![ModuleMatch {
                module: DEFAULT_MODULE.to_owned(),
                confidence: 1.0,
                keywords: Vec::new(),
            }]
        };
        if lowered.is_empty() {
            return default();
        }

        let mut results: Vec<ModuleMatch> = self
            .modules
            .iter()
            .filter_map(|def| {
                let matched: Vec<String> = def
                    .keywords
                    .iter()
                    .filter(|k| lowered.contains(&k.to_lowercase()))
                    .cloned()
                    .collect();
                if matched.is_empty() {
                    return None;
                }
                Some(ModuleMatch {
                    module: def.name.clone(),
                    confidence: matched.len() as f64 / def.keywords.len() as f64,
                    keywords: matched,
                })
            })
            .collect();

        // Stable sort keeps table order among equal confidences.
        results.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        if results.is_empty() { default() } else { results }
    }

    /// Add a module, replacing the keyword list if it already exists.
    pub fn add_module(&mut self, name: impl Into<String>, keywords: Vec<String>) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(KernelError::InvalidModule {
                module: name,
                reason: "module name is empty".into(),
            });
        }

        match self.modules.iter_mut().find(|m| m.name == name) {
            Some(existing) => existing.keywords = keywords,
            None => self.modules.push(ModuleDefinition {
                name: name.clone(),
                keywords,
            }),
        }
        tracing::debug!(module = %name, "classifier module added");
        self.rebuild();
        Ok(())
    }

    /// Remove a module.  Returns `false` if it was not registered.
    pub fn remove_module(&mut self, name: &str) -> bool {
        let before = self.modules.len();
        self.modules.retain(|m| m.name != name);
        if self.modules.len() == before {
            return false;
        }
        tracing::debug!(module = %name, "classifier module removed");
        self.rebuild();
        true
    }

    /// Names of all registered modules, in priority order.
    pub fn modules(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name.as_str()).collect()
    }

    /// Keywords of a module (empty if unknown).
    pub fn keywords_for(&self, name: &str) -> &[String] {
        self.modules
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.keywords.as_slice())
            .unwrap_or(&[])
    }

    /// Check the table for empty entries and cross-module duplicates.
    pub fn validate(&self) -> ClassifierValidation {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut owners: Vec<(String, &str)> = Vec::new();

        for def in &self.modules {
            if def.name.trim().is_empty() {
                errors.push("module with an empty name".to_owned());
            }
            if def.keywords.is_empty() {
                errors.push(format!("module {} has no keywords", def.name));
            }
            for keyword in &def.keywords {
                let lowered = keyword.to_lowercase();
                if lowered.trim().is_empty() {
                    errors.push(format!("module {} has an empty keyword", def.name));
                    continue;
                }
                match owners.iter().find(|(k, _)| *k == lowered) {
                    Some((_, owner)) if *owner != def.name => warnings.push(format!(
                        "Duplicate keyword '{keyword}' in modules: {owner} and {}",
                        def.name
                    )),
                    Some(_) => {}
                    None => owners.push((lowered, def.name.as_str())),
                }
            }
        }

        ClassifierValidation {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Export the table with summary metadata.
    pub fn export_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            modules: self.modules.clone(),
            metadata: Some(ClassifierConfigMetadata {
                total_modules: self.modules.len(),
                total_keywords: self.keyword_index.len(),
                exported_at: Utc::now(),
            }),
        }
    }

    /// Replace the table with `config`.  Returns `false` (and keeps the
    /// current table) if the configuration has no modules.
    pub fn import_config(&mut self, config: ClassifierConfig) -> bool {
        if config.modules.is_empty() {
            tracing::warn!("rejecting classifier config without modules");
            return false;
        }
        self.modules = config.modules;
        self.rebuild();
        true
    }

    // -- Private helpers ----------------------------------------------------

    fn rebuild(&mut self) {
        let mut index: Vec<(String, String)> = Vec::new();
        for def in &self.modules {
            for keyword in &def.keywords {
                let lowered = keyword.to_lowercase();
                if lowered.trim().is_empty() {
                    continue;
                }
                match index.iter_mut().find(|(k, _)| *k == lowered) {
                    Some(entry) => entry.1 = def.name.clone(),
                    None => index.push((lowered, def.name.clone())),
                }
            }
        }
        self.keyword_index = index;

        if self.keyword_index.is_empty() {
            self.automaton = None;
            return;
        }

        let patterns: Vec<&str> = self.keyword_index.iter().map(|(k, _)| k.as_str()).collect();
        match AhoCorasick::builder()
            .match_kind(MatchKind::Standard)
            .build(&patterns)
        {
            Ok(ac) => {
                self.automaton = Some(ac);
                tracing::trace!(count = patterns.len(), "classifier automaton rebuilt");
            }
            Err(e) => {
                let err = KernelError::ClassifierBuild {
                    reason: e.to_string(),
                };
                tracing::error!(error = %err, "falling back to linear keyword scan");
                self.automaton = None;
            }
        }
    }
}

impl Default for ModuleClassifier {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_case_insensitive() {
        let c = ModuleClassifier::new();
        assert_eq!(c.classify("Wystaw FAKTURĘ"), "Finanse");
        assert_eq!(c.classify("powiadom sprzedaż"), "Powiadomienia");
    }

    #[test]
    fn classify_uses_table_order_not_text_order() {
        let c = ModuleClassifier::new();
        // "klient" (CRM) appears first in the text but "płaci" belongs to an
        // earlier module.
        assert_eq!(c.classify("klient zapłaci"), "Platnosci");
    }

    #[test]
    fn duplicate_keyword_belongs_to_later_module() {
        let c = ModuleClassifier::new();
        // "raport" is listed under Finanse and Analiza.
        assert_eq!(c.classify("miesięczny raport"), "Analiza");
    }

    #[test]
    fn empty_and_unknown_text_is_default() {
        let c = ModuleClassifier::new();
        assert_eq!(c.classify(""), DEFAULT_MODULE);
        assert_eq!(c.classify("zupełnie nic"), DEFAULT_MODULE);
        assert_eq!(ModuleClassifier::empty().classify("faktura"), DEFAULT_MODULE);
    }

    #[test]
    fn confidence_is_ranked() {
        let c = ModuleClassifier::new();
        let ranked = c.classify_with_confidence("magazyn stock inventory towar i faktura");
        assert_eq!(ranked[0].module, "Magazyn");
        assert!(ranked[0].confidence > ranked[1].confidence);
        assert!(ranked.iter().any(|m| m.module == "Finanse"));

        let none = c.classify_with_confidence("nic");
        assert_eq!(none.len(), 1);
        assert_eq!(none[0].module, DEFAULT_MODULE);
        assert_eq!(none[0].confidence, 1.0);
    }

    #[test]
    fn add_and_remove_module() {
        let mut c = ModuleClassifier::empty();
        c.add_module("Serwis", vec!["zgłoszenie".into(), "awaria".into()])
            .unwrap();
        assert_eq!(c.classify("nowe Zgłoszenie serwisowe"), "Serwis");
        assert_eq!(c.modules(), vec!["Serwis"]);
        assert_eq!(c.keywords_for("Serwis").len(), 2);

        assert!(c.remove_module("Serwis"));
        assert!(!c.remove_module("Serwis"));
        assert_eq!(c.classify("awaria"), DEFAULT_MODULE);
        assert!(c.add_module("  ", vec![]).is_err());
    }

    #[test]
    fn validate_reports_duplicates_as_warnings() {
        let report = ModuleClassifier::new().validate();
        assert!(report.is_valid);
        assert!(report.warnings.iter().any(|w| w.contains("'raport'")));
    }

    #[test]
    fn export_import_round_trip() {
        let source = ModuleClassifier::new();
        let config = source.export_config();
        assert_eq!(config.metadata.as_ref().unwrap().total_modules, 12);

        let mut target = ModuleClassifier::empty();
        assert!(target.import_config(config));
        assert_eq!(target.classify("wystaw fakturę"), "Finanse");

        let empty = ClassifierConfig {
            modules: vec![],
            metadata: None,
        };
        assert!(!target.import_config(empty));
        assert_eq!(target.modules().len(), 12);
    }
}

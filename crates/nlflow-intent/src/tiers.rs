//! Extraction tiers.
//!
//! Each tier is a pure strategy `(text, lang) -> Option<Split>`.  The
//! normalizer tries them in order and the first one that returns a split
//! wins.  The last tier always succeeds.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::grammar::Grammar;
use crate::lang::{Lang, ON_DEMAND_CONDITION};

/// Shortest condition (in bytes) the verb-locate tier accepts.
const MIN_CONDITION_OFFSET: usize = 3;

/// Which tier produced a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Marker, then split at the first action verb.
    MarkerVerb,
    /// Marker, then split at a comma, colon, dash or connector word.
    MarkerDelimiter,
    /// Left of the first comma is the condition.
    CommaSplit,
    /// `action ... marker condition`.
    Reverse,
    /// Leading marker stripped, split at the first action verb.
    VerbLocate,
    /// Whole sentence is one on-demand action.
    LastResort,
    /// Produced by the LLM fallback rather than a heuristic tier.
    Llm,
}

/// A sentence cut into its condition and action tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub condition: String,
    pub tail: String,
}

impl Split {
    fn new(condition: &str, tail: &str) -> Self {
        Self {
            condition: condition.trim().to_owned(),
            tail: tail.trim().to_owned(),
        }
    }
}

/// One extraction strategy.
pub trait SplitStrategy: Send + Sync {
    fn tier(&self) -> Tier;

    /// Try to split whitespace-normalized `text`.
    fn split(&self, text: &str, lang: Lang) -> Option<Split>;
}

/// The built-in tiers in priority order.
pub fn default_tiers(grammar: Arc<Grammar>) -> Vec<Box<dyn SplitStrategy>> {
    vec![
        Box::new(MarkerVerb {
            grammar: grammar.clone(),
        }),
        Box::new(MarkerDelimiter {
            grammar: grammar.clone(),
        }),
        Box::new(CommaSplit),
        Box::new(Reverse {
            grammar: grammar.clone(),
        }),
        Box::new(VerbLocate {
            grammar: grammar.clone(),
        }),
        Box::new(LastResort { grammar }),
    ]
}

// ---------------------------------------------------------------------------
// Tier 1
// ---------------------------------------------------------------------------

pub struct MarkerVerb {
    grammar: Arc<Grammar>,
}

impl SplitStrategy for MarkerVerb {
    fn tier(&self) -> Tier {
        Tier::MarkerVerb
    }

    fn split(&self, text: &str, lang: Lang) -> Option<Split> {
        for patterns in self.grammar.markers_for(lang) {
            for marker in patterns.marker.find_iter(text) {
                let body = &text[marker.end()..];
                // The verb must follow whitespace and leave a non-empty
                // condition in front of it.
                let verb = self.grammar.verbs().find_iter(body).find(|v| {
                    v.start() > 0
                        && body[..v.start()].ends_with(char::is_whitespace)
                        && !trim_separators(&body[..v.start()]).is_empty()
                });
                if let Some(verb) = verb {
                    return Some(Split::new(
                        trim_separators(&body[..verb.start()]),
                        &body[verb.start()..],
                    ));
                }
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Tier 2
// ---------------------------------------------------------------------------

pub struct MarkerDelimiter {
    grammar: Arc<Grammar>,
}

impl SplitStrategy for MarkerDelimiter {
    fn tier(&self) -> Tier {
        Tier::MarkerDelimiter
    }

    fn split(&self, text: &str, lang: Lang) -> Option<Split> {
        self.grammar.markers_for(lang).find_map(|patterns| {
            let caps = patterns.delimited.captures(text)?;
            Some(Split::new(caps.get(1)?.as_str(), caps.get(2)?.as_str()))
        })
    }
}

// ---------------------------------------------------------------------------
// Tier 3
// ---------------------------------------------------------------------------

pub struct CommaSplit;

impl SplitStrategy for CommaSplit {
    fn tier(&self) -> Tier {
        Tier::CommaSplit
    }

    fn split(&self, text: &str, _lang: Lang) -> Option<Split> {
        match text.find(',') {
            Some(idx) if idx > 0 => Some(Split::new(&text[..idx], &text[idx + 1..])),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tier 4
// ---------------------------------------------------------------------------

pub struct Reverse {
    grammar: Arc<Grammar>,
}

impl SplitStrategy for Reverse {
    fn tier(&self) -> Tier {
        Tier::Reverse
    }

    fn split(&self, text: &str, lang: Lang) -> Option<Split> {
        self.grammar.markers_for(lang).find_map(|patterns| {
            let caps = patterns.reverse.captures(text)?;
            Some(Split::new(caps.get(2)?.as_str(), caps.get(1)?.as_str()))
        })
    }
}

// ---------------------------------------------------------------------------
// Tier 5
// ---------------------------------------------------------------------------

pub struct VerbLocate {
    grammar: Arc<Grammar>,
}

impl SplitStrategy for VerbLocate {
    fn tier(&self) -> Tier {
        Tier::VerbLocate
    }

    fn split(&self, text: &str, _lang: Lang) -> Option<Split> {
        let stripped = strip_leading_marker(&self.grammar, text);
        let verb = self.grammar.verbs().find(stripped)?;
        if verb.start() <= MIN_CONDITION_OFFSET {
            return None;
        }
        Some(Split::new(
            &stripped[..verb.start()],
            &stripped[verb.start()..],
        ))
    }
}

// ---------------------------------------------------------------------------
// Tier 6
// ---------------------------------------------------------------------------

pub struct LastResort {
    grammar: Arc<Grammar>,
}

impl SplitStrategy for LastResort {
    fn tier(&self) -> Tier {
        Tier::LastResort
    }

    fn split(&self, text: &str, _lang: Lang) -> Option<Split> {
        let stripped = strip_leading_marker(&self.grammar, text);
        let tail = if stripped.trim().is_empty() {
            text
        } else {
            stripped
        };
        Some(Split::new(ON_DEMAND_CONDITION, tail))
    }
}

fn strip_leading_marker<'a>(grammar: &Grammar, text: &'a str) -> &'a str {
    match grammar.leading_marker().find(text) {
        Some(m) => &text[m.end()..],
        None => text,
    }
}

/// Trim whitespace and trailing separators left between a condition and
/// the verb that follows it.
fn trim_separators(text: &str) -> &str {
    text.trim()
        .trim_end_matches([',', ':', ';', '-'])
        .trim_end()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn grammar() -> Arc<Grammar> {
        Arc::new(Grammar::new().unwrap())
    }

    fn split(strategy: &dyn SplitStrategy, text: &str) -> Option<(String, String)> {
        strategy
            .split(text, Lang::Und)
            .map(|s| (s.condition, s.tail))
    }

    #[test]
    fn marker_verb_splits_without_delimiter() {
        let tier = MarkerVerb { grammar: grammar() };
        assert_eq!(
            split(&tier, "kiedy klient zapłaci wyślij fakturę i powiadom sprzedaż"),
            Some((
                "klient zapłaci".into(),
                "wyślij fakturę i powiadom sprzedaż".into()
            ))
        );
    }

    #[test]
    fn marker_verb_drops_trailing_comma() {
        let tier = MarkerVerb { grammar: grammar() };
        assert_eq!(
            split(&tier, "Gdy termin minie, wyślij ponaglenie"),
            Some(("termin minie".into(), "wyślij ponaglenie".into()))
        );
    }

    #[test]
    fn marker_verb_needs_a_verb() {
        let tier = MarkerVerb { grammar: grammar() };
        assert_eq!(split(&tier, "when it rains, close windows"), None);
    }

    #[test]
    fn marker_delimiter_accepts_connectors() {
        let tier = MarkerDelimiter { grammar: grammar() };
        assert_eq!(
            split(&tier, "when it rains, close windows"),
            Some(("it rains".into(), "close windows".into()))
        );
        assert_eq!(
            split(&tier, "gdy pada wtedy zamknij okna"),
            Some(("pada".into(), "zamknij okna".into()))
        );
        assert_eq!(
            split(&tier, "if backup fails: page oncall"),
            Some(("backup fails".into(), "page oncall".into()))
        );
    }

    #[test]
    fn comma_split_requires_text_before_comma() {
        assert_eq!(
            split(&CommaSplit, "backup failed, page oncall"),
            Some(("backup failed".into(), "page oncall".into()))
        );
        assert_eq!(split(&CommaSplit, ", page oncall"), None);
        assert_eq!(split(&CommaSplit, "no comma"), None);
    }

    #[test]
    fn reverse_takes_condition_after_marker() {
        let tier = Reverse { grammar: grammar() };
        assert_eq!(
            split(&tier, "close windows when it rains"),
            Some(("it rains".into(), "close windows".into()))
        );
    }

    #[test]
    fn verb_locate_respects_min_offset() {
        let tier = VerbLocate { grammar: grammar() };
        assert_eq!(
            split(&tier, "faktura opłacona wyślij potwierdzenie"),
            Some(("faktura opłacona".into(), "wyślij potwierdzenie".into()))
        );
        assert_eq!(split(&tier, "ok send report"), None);
    }

    #[test]
    fn last_resort_is_on_demand() {
        let tier = LastResort { grammar: grammar() };
        assert_eq!(
            split(&tier, "zamknij kasę"),
            Some((ON_DEMAND_CONDITION.into(), "zamknij kasę".into()))
        );
    }

    #[test]
    fn lang_hint_limits_markers() {
        let tier = MarkerDelimiter { grammar: grammar() };
        assert!(tier.split("wenn Kunde zahlt, sende Rechnung", Lang::Pl).is_none());
        assert!(tier.split("wenn Kunde zahlt, sende Rechnung", Lang::De).is_some());
    }

    #[test]
    fn default_order() {
        let tiers: Vec<Tier> = default_tiers(grammar()).iter().map(|t| t.tier()).collect();
        assert_eq!(
            tiers,
            vec![
                Tier::MarkerVerb,
                Tier::MarkerDelimiter,
                Tier::CommaSplit,
                Tier::Reverse,
                Tier::VerbLocate,
                Tier::LastResort
            ]
        );
    }
}

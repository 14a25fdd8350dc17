//! Compiled patterns built from the language tables.
//!
//! A [`Grammar`] is built once per normalizer and shared by every
//! extraction tier, the tail splitter and the numeric extractor.

use regex::Regex;

use crate::error::{IntentError, Result};
use crate::lang::{CONNECTORS, Lang};

/// Marker patterns for one language.
#[derive(Debug, Clone)]
pub struct MarkerPatterns {
    pub lang: Lang,
    /// A marker followed by whitespace, anywhere in the text.
    pub marker: Regex,
    /// `marker condition <delimiter> tail`.
    pub delimited: Regex,
    /// `tail marker condition`.
    pub reverse: Regex,
}

/// Every compiled pattern the normalizer needs.
#[derive(Debug, Clone)]
pub struct Grammar {
    markers: Vec<MarkerPatterns>,
    /// Any marker of any language at the very start of the text.
    leading_marker: Regex,
    /// Any action verb of any language as a whole word.
    verbs: Regex,
    /// A verb with nothing else around it.
    bare_verb: Regex,
    /// Conjunction splitters, one per language.
    conjunctions: Vec<(Lang, Regex)>,
    /// Separators and connector words at the start of a recovered tail.
    leading_separator: Regex,
}

impl Grammar {
    /// Compile the built-in language tables.
    pub fn new() -> Result<Self> {
        let connectors = alternation(CONNECTORS);

        let mut markers = Vec::with_capacity(Lang::KNOWN.len());
        for lang in Lang::KNOWN {
            let alts = alternation(lang.markers());
            markers.push(MarkerPatterns {
                lang,
                marker: compile(&format!(r"(?i)(?:^|\b)(?:{alts})\s+"))?,
                delimited: compile(&format!(
                    r"(?i)(?:^|\b)(?:{alts})\s+(.+?)(?:,|:|-|\s+(?:{connectors})\s+)\s*(.+)$"
                ))?,
                reverse: compile(&format!(r"(?i)^(.+?)\s+(?:{alts})\s+(.+)$"))?,
            });
        }

        let all_markers: Vec<&str> = Lang::KNOWN
            .iter()
            .flat_map(|l| l.markers().iter().copied())
            .collect();
        let all_verbs: Vec<&str> = Lang::KNOWN
            .iter()
            .flat_map(|l| l.action_verbs().iter().copied())
            .collect();
        let verb_alts = alternation(&all_verbs);

        let mut conjunctions = Vec::with_capacity(Lang::KNOWN.len());
        for lang in Lang::KNOWN {
            let alts = alternation(lang.conjunctions());
            conjunctions.push((lang, compile(&format!(r"(?i)\s+(?:(?:{alts})\s+)+"))?));
        }

        Ok(Self {
            markers,
            leading_marker: compile(&format!(r"(?i)^(?:{})\s+", alternation(&all_markers)))?,
            verbs: compile(&format!(r"(?i)\b(?:{verb_alts})\b"))?,
            bare_verb: compile(&format!(r"(?i)^\s*(?:{verb_alts})\s*[.!,;:]*\s*$"))?,
            conjunctions,
            leading_separator: compile(&format!(r"(?i)^(?:[\s,:;\-]+|(?:{connectors})\s+)+"))?,
        })
    }

    /// Marker patterns to try for a language hint, in table order.
    pub fn markers_for(&self, lang: Lang) -> impl Iterator<Item = &MarkerPatterns> {
        let candidates = lang.candidates();
        self.markers
            .iter()
            .filter(move |m| candidates.contains(&m.lang))
    }

    pub fn leading_marker(&self) -> &Regex {
        &self.leading_marker
    }

    pub fn verbs(&self) -> &Regex {
        &self.verbs
    }

    /// Whether `text` is a single action verb and nothing else.
    pub fn is_bare_verb(&self, text: &str) -> bool {
        self.bare_verb.is_match(text)
    }

    /// Conjunction splitters with the hinted language first.
    pub fn conjunctions_for(&self, lang: Lang) -> Vec<&Regex> {
        lang.preference_order()
            .into_iter()
            .filter_map(|l| {
                self.conjunctions
                    .iter()
                    .find(|(cl, _)| *cl == l)
                    .map(|(_, re)| re)
            })
            .collect()
    }

    /// Strip separators and connector words from the start of `text`.
    pub fn strip_leading_separator<'a>(&self, text: &'a str) -> &'a str {
        match self.leading_separator.find(text) {
            Some(m) => &text[m.end()..],
            None => text,
        }
    }
}

/// Build a regex alternation, longest words first so that a shorter word
/// never shadows a longer one sharing its prefix.
fn alternation(words: &[&str]) -> String {
    let mut words: Vec<&str> = words.to_vec();
    words.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
    words.dedup();
    words
        .iter()
        .map(|w| regex::escape(w).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|")
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| IntentError::Pattern {
        pattern: pattern.to_owned(),
        reason: e.to_string(),
    })
}

/// Collapse whitespace runs into single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grammar_compiles() {
        let g = Grammar::new().unwrap();
        assert_eq!(g.markers_for(Lang::Und).count(), Lang::KNOWN.len());
        assert_eq!(g.markers_for(Lang::Fr).count(), 1);
        assert_eq!(g.conjunctions_for(Lang::Und).len(), Lang::KNOWN.len());
    }

    #[test]
    fn verbs_match_whole_words_only() {
        let g = Grammar::new().unwrap();
        assert!(g.verbs().is_match("Wyślij fakturę"));
        assert!(!g.verbs().is_match("address book"));
        assert!(g.is_bare_verb(" notify. "));
        assert!(!g.is_bare_verb("notify team"));
    }

    #[test]
    fn leading_separator_is_stripped() {
        let g = Grammar::new().unwrap();
        assert_eq!(g.strip_leading_separator(", wtedy wyślij"), "wyślij");
        assert_eq!(g.strip_leading_separator(" - send"), "send");
        assert_eq!(g.strip_leading_separator("tomorrow"), "tomorrow");
    }

    #[test]
    fn whitespace_normalization() {
        assert_eq!(normalize_whitespace("  a \t b\n c "), "a b c");
    }
}

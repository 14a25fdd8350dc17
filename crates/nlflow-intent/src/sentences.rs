//! Strict `Gdy <condition>, <actions>` sentences and multi-sentence input.

use regex::Regex;
use serde::{Deserialize, Serialize};

use nlflow_kernel::{ModuleClassifier, Step, TextSanitizer};

use crate::error::{IntentError, Result};

/// Condition and action texts of a strict sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSentence {
    pub condition: String,
    pub actions: Vec<String>,
}

/// Compiled patterns for strict sentences.
#[derive(Debug, Clone)]
pub struct SentenceParser {
    sentence: Regex,
    conjunctions: Regex,
    chunk_break: Regex,
    valid_chunk: Regex,
}

impl SentenceParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            sentence: compile(r"(?i)gdy\s+(.+?),\s+(.+)")?,
            conjunctions: compile(r"(?i)\s+(?:i|oraz|a\s+także|następnie)\s+")?,
            chunk_break: compile(r"\n+|[.!?]\s+")?,
            valid_chunk: compile(r"(?i)^gdy\s+.+?,\s+.+")?,
        })
    }

    /// Parse `"Gdy wpłata klienta nastąpi, wystaw fakturę i uruchom
    /// kampanię"` into its condition and actions.
    pub fn parse_sentence(&self, sentence: &str) -> Result<ParsedSentence> {
        if sentence.trim().is_empty() {
            return Err(IntentError::InvalidInput {
                reason: "sentence must be a non-empty string".into(),
            });
        }
        let caps = self
            .sentence
            .captures(sentence)
            .ok_or_else(|| IntentError::SentenceFormat {
                sentence: sentence.to_owned(),
            })?;

        let condition = caps[1].trim().to_owned();
        let actions = self
            .conjunctions
            .split(&caps[2])
            .map(|a| a.trim().trim_end_matches('.').trim().to_owned())
            .filter(|a| !a.is_empty())
            .collect();
        Ok(ParsedSentence { condition, actions })
    }

    /// Split a text blob into strict sentences.
    ///
    /// Breaks on newlines and on sentence-ending punctuation followed by
    /// whitespace, keeps only chunks of the `Gdy ..., ...` shape and strips
    /// their trailing punctuation.
    pub fn parse_multiple_sentences(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut last = 0;
        for m in self.chunk_break.find_iter(text) {
            // Keep the punctuation with the sentence it ends.
            let end = if m.as_str().starts_with(['.', '!', '?']) {
                m.start() + 1
            } else {
                m.start()
            };
            chunks.push(&text[last..end]);
            last = m.end();
        }
        chunks.push(&text[last..]);

        chunks
            .into_iter()
            .map(str::trim)
            .filter(|c| !c.is_empty() && self.valid_chunk.is_match(c))
            .map(|c| c.trim_end_matches(['.', '!', '?']).to_owned())
            .collect()
    }
}

/// Build a step from a condition and its actions.
pub fn build_step<S: AsRef<str>>(
    condition: &str,
    actions: &[S],
    sanitizer: &TextSanitizer,
    classifier: &ModuleClassifier,
) -> Step {
    Step::build(condition, actions, sanitizer, classifier)
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| IntentError::Pattern {
        pattern: pattern.to_owned(),
        reason: e.to_string(),
    })
}

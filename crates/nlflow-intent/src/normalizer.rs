//! Sentence normalizer: trigger sentence → condition, actions and numeric
//! thresholds.
//!
//! Extraction runs the tiers from [`crate::tiers`] in order, splits the
//! winning tail into actions, recovers from a tail that collapsed into a
//! bare verb, and finally extracts numeric conditions.  The result carries a
//! ready-built [`Step`] so callers can hand it straight to the engine.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use nlflow_kernel::{ModuleClassifier, Step, TextSanitizer};

use crate::error::{IntentError, Result};
use crate::grammar::{Grammar, normalize_whitespace};
use crate::lang::Lang;
use crate::numeric::{NumericCondition, NumericExtractor};
use crate::tail::{recover_isolated_verb, split_actions};
use crate::tiers::{Split, SplitStrategy, Tier, default_tiers};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Caller options.  Also part of the LLM cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizeOptions {
    /// Language hint.  `None` consults every language table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<Lang>,
    /// Model override for the LLM fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl NormalizeOptions {
    pub fn with_lang(lang: Lang) -> Self {
        Self {
            lang: Some(lang),
            ..Self::default()
        }
    }
}

/// Condition, actions and thresholds extracted from one sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalized {
    pub condition: String,
    pub actions: Vec<String>,
    #[serde(default)]
    pub numeric_conditions: Vec<NumericCondition>,
}

/// Full normalizer result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeOutcome {
    pub normalized: Normalized,
    /// Which tier produced the split.
    pub tier: Tier,
    /// Hinted or detected language.
    pub lang: Lang,
    /// The step built from the condition and actions.
    pub step: Step,
    /// `true` when the LLM fallback produced this result.
    #[serde(default)]
    pub llm: bool,
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Stateless, tiered sentence normalizer.
pub struct SentenceNormalizer {
    sanitizer: Arc<TextSanitizer>,
    classifier: Arc<ModuleClassifier>,
    grammar: Arc<Grammar>,
    tiers: Vec<Box<dyn SplitStrategy>>,
    numeric: NumericExtractor,
}

impl SentenceNormalizer {
    /// Create a normalizer with the built-in tiers.
    pub fn new(sanitizer: Arc<TextSanitizer>, classifier: Arc<ModuleClassifier>) -> Result<Self> {
        let grammar = Arc::new(Grammar::new()?);
        Ok(Self {
            sanitizer,
            classifier,
            tiers: default_tiers(grammar.clone()),
            grammar,
            numeric: NumericExtractor::new()?,
        })
    }

    /// Replace the tier list.  The last tier should always succeed; if none
    /// does, the sentence becomes a single on-demand action.
    pub fn with_tiers(mut self, tiers: Vec<Box<dyn SplitStrategy>>) -> Self {
        self.tiers = tiers;
        self
    }

    /// Tiers in the order they are tried.
    pub fn tiers(&self) -> Vec<Tier> {
        self.tiers.iter().map(|t| t.tier()).collect()
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn sanitizer(&self) -> &TextSanitizer {
        &self.sanitizer
    }

    pub fn classifier(&self) -> &ModuleClassifier {
        &self.classifier
    }

    /// Run the tiers over whitespace-normalized `text`.
    pub fn split(&self, text: &str, lang: Lang) -> (Tier, Split) {
        for tier in &self.tiers {
            if let Some(split) = tier.split(text, lang)
                && !split.condition.is_empty()
                && !split.tail.is_empty()
            {
                debug!(tier = ?tier.tier(), condition = %split.condition, "tier matched");
                return (tier.tier(), split);
            }
        }
        (
            Tier::LastResort,
            Split {
                condition: crate::lang::ON_DEMAND_CONDITION.to_owned(),
                tail: text.to_owned(),
            },
        )
    }

    /// Split a tail into actions.
    pub fn split_actions(&self, tail: &str, lang: Lang) -> Vec<String> {
        split_actions(&self.grammar, tail, lang)
    }

    /// Extract numeric thresholds from arbitrary text.
    pub fn extract_numeric(&self, text: &str) -> Vec<NumericCondition> {
        self.numeric.extract(&self.sanitizer, text)
    }

    /// Normalize one trigger sentence.
    ///
    /// Fails only for empty input; everything else degrades through the
    /// tiers down to a single on-demand action.
    pub fn normalize(&self, text: &str, options: &NormalizeOptions) -> Result<NormalizeOutcome> {
        let text = normalize_whitespace(text);
        if text.is_empty() {
            return Err(IntentError::InvalidInput {
                reason: "sentence is empty".into(),
            });
        }

        let hint = options.lang.unwrap_or_default();
        let lang = options.lang.unwrap_or_else(|| Lang::detect(&text));

        let (tier, split) = self.split(&text, hint);
        let condition = clean_condition(&split.condition);

        let mut actions = self.split_actions(&split.tail, hint);
        if let Some(recovered) = recover_isolated_verb(
            &self.grammar,
            &self.sanitizer,
            &text,
            &condition,
            &actions,
            hint,
        ) {
            debug!(before = ?actions, after = ?recovered, "recovered isolated verb");
            actions = recovered;
        }

        let numeric_conditions = self.extract_numeric(&format!("{} {}", condition, split.tail));

        let outcome = self.finish(condition, actions, numeric_conditions, tier, lang, false);
        info!(
            tier = ?outcome.tier,
            step_id = %outcome.step.id,
            actions = outcome.normalized.actions.len(),
            "sentence normalized"
        );
        Ok(outcome)
    }

    /// Build the outcome (and its step) from extracted parts.
    pub(crate) fn finish(
        &self,
        condition: String,
        actions: Vec<String>,
        numeric_conditions: Vec<NumericCondition>,
        tier: Tier,
        lang: Lang,
        llm: bool,
    ) -> NormalizeOutcome {
        let step = Step::build(&condition, &actions, &self.sanitizer, &self.classifier);
        NormalizeOutcome {
            normalized: Normalized {
                condition,
                actions,
                numeric_conditions,
            },
            tier,
            lang,
            step,
            llm,
        }
    }
}

/// Collapse whitespace and drop trailing punctuation from a condition.
pub(crate) fn clean_condition(condition: &str) -> String {
    normalize_whitespace(condition)
        .trim_end_matches([',', ':', ';', '-', '.'])
        .trim_end()
        .to_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

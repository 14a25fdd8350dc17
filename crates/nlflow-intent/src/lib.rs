//! Trigger-sentence normalization for nlflow.
//!
//! This crate provides:
//!
//! - **Sentence normalization**: ordered heuristic tiers that split a
//!   sentence into a condition and actions via
//!   [`normalizer::SentenceNormalizer`].
//! - **LLM fallback**: [`llm::LlmNormalizer`] asks a completion backend for
//!   strict JSON and memoizes successful results.
//! - **Numeric conditions**: thresholds such as "poniżej 5 sztuk" via
//!   [`numeric::NumericExtractor`].
//! - **Rules**: `field operator value` parsing and evaluation via
//!   [`rules`].
//! - **Strict sentences**: the `Gdy X, Y` form and multi-sentence input
//!   via [`sentences::SentenceParser`].

pub mod error;
pub mod grammar;
pub mod lang;
pub mod llm;
pub mod normalizer;
pub mod numeric;
pub mod rules;
pub mod sentences;
pub mod tail;
pub mod tiers;

pub use error::{IntentError, Result};
pub use lang::{Lang, ON_DEMAND_CONDITION};
pub use llm::{CACHE_CAPACITY, LlmNormalizer, LlmOutcome};
pub use normalizer::{NormalizeOptions, NormalizeOutcome, Normalized, SentenceNormalizer};
pub use numeric::{NumericCondition, NumericExtractor, NumericOperator};
pub use rules::{
    Condition, Operator, Rule, RuleSet, RuleSetResult, evaluate_condition, evaluate_rule_set,
    parse_condition,
};
pub use sentences::{ParsedSentence, SentenceParser, build_step};
pub use tiers::{Split, SplitStrategy, Tier};

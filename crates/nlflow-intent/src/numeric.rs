//! Numeric threshold extraction ("poniżej 5 sztuk", "above 80%").
//!
//! Runs on the folded condition and tail, independently of how the
//! sentence was split.  The field name is a coarse keyword guess.

use regex::Regex;
use serde::{Deserialize, Serialize};

use nlflow_kernel::TextSanitizer;

use crate::error::{IntentError, Result};

/// Field used when inventory vocabulary is present.
pub const STOCK_FIELD: &str = "stock";

/// Field used otherwise.
pub const VALUE_FIELD: &str = "value";

const STOCK_WORDS: &[&str] = &["magazyn", "stan", "stock", "inventory", "zapas"];

/// Comparison direction of a [`NumericCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumericOperator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "==")]
    Eq,
}

impl NumericOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Eq => "==",
        }
    }
}

/// A threshold found in a sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericCondition {
    pub field: String,
    pub operator: NumericOperator,
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
}

/// Compiled numeric-phrase matcher.
#[derive(Debug, Clone)]
pub struct NumericExtractor {
    pattern: Regex,
}

impl NumericExtractor {
    pub fn new() -> Result<Self> {
        let pattern = r"(?x)
            (?:
                (?P<lt>\bponizej|\bbelow|\bunder|\bless\s+than|\bmniej\s+niz|\bmniejsz[aey]\s+niz|<)
              | (?P<gt>\bpowyzej|\babove|\bover|\bmore\s+than|\bgreater\s+than|\bwiecej\s+niz|\bwieksz[aey]\s+niz|>)
              | (?P<eq>\browno|\browne|\bequals?(?:\s+to)?|==?)
            )
            \s*
            (?P<num>\d+(?:[.,]\d+)?)
            (?:\s*(?P<unit>%|procent\w*|percent\b|sztuk\w*|szt\b|pieces?\b|pcs\b|items?\b))?
        ";
        let pattern = Regex::new(pattern).map_err(|e| IntentError::Pattern {
            pattern: "numeric".into(),
            reason: e.to_string(),
        })?;
        Ok(Self { pattern })
    }

    /// Extract every threshold in `text`, in order of appearance.
    pub fn extract(&self, sanitizer: &TextSanitizer, text: &str) -> Vec<NumericCondition> {
        let folded = sanitizer.fold(text);
        let field = if STOCK_WORDS.iter().any(|w| folded.contains(w)) {
            STOCK_FIELD
        } else {
            VALUE_FIELD
        };

        self.pattern
            .captures_iter(&folded)
            .filter_map(|caps| {
                let operator = if caps.name("lt").is_some() {
                    NumericOperator::Lt
                } else if caps.name("gt").is_some() {
                    NumericOperator::Gt
                } else {
                    NumericOperator::Eq
                };
                let value = caps["num"].replace(',', ".").parse::<f64>().ok()?;
                let unit = caps.name("unit").map(|u| canonical_unit(u.as_str()).to_owned());
                Some(NumericCondition {
                    field: field.to_owned(),
                    operator,
                    value,
                    unit,
                })
            })
            .collect()
    }
}

fn canonical_unit(unit: &str) -> &'static str {
    if unit == "%" || unit.starts_with("procent") || unit == "percent" {
        "percent"
    } else if unit.starts_with("item") {
        "items"
    } else {
        "pieces"
    }
}

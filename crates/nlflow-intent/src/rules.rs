//! Rule conditions: parsing "amount > 100" style text and evaluating it
//! against a JSON context.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operator of a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "!contains")]
    NotContains,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Contains => "contains",
            Self::NotContains => "!contains",
        }
    }
}

/// A parsed `field operator value` condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: String,
    /// The text the condition was parsed from.
    #[serde(default)]
    pub raw: String,
}

/// A rule given either as text or as an already parsed condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rule {
    Text(String),
    Parsed(Condition),
}

impl Rule {
    fn to_condition(&self) -> Condition {
        match self {
            Self::Text(text) => parse_condition(text),
            Self::Parsed(cond) => cond.clone(),
        }
    }
}

/// `all` rules must all pass; at least one `any` rule must pass when
/// `any` is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub all: Vec<Rule>,
    #[serde(default)]
    pub any: Vec<Rule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleMode {
    All,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDetail {
    pub condition: Condition,
    pub result: bool,
    pub mode: RuleMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSetResult {
    pub passed: bool,
    pub details: Vec<RuleDetail>,
}

/// Polish operator phrases rewritten to symbols before parsing.
const PHRASES: &[(&str, &str)] = &[
    ("większe niż", ">"),
    ("mniejsze niż", "<"),
    ("różne od", "!="),
    ("równe", "="),
];

/// Operators in match priority order.  Word operators are matched as whole
/// words, negated ones before their positive form.
const SYMBOLS: &[(&str, Operator)] = &[
    (">=", Operator::Ge),
    ("<=", Operator::Le),
    ("!=", Operator::Ne),
    (">", Operator::Gt),
    ("<", Operator::Lt),
    ("=", Operator::Eq),
];

const WORDS: &[(&str, Operator)] = &[
    ("!contains", Operator::NotContains),
    ("nie zawiera", Operator::NotContains),
    ("contains", Operator::Contains),
    ("zawiera", Operator::Contains),
];

/// Parse a condition such as `"amount > 100"`, `"kwota większe niż 100"` or
/// `"tags contains vip"`.
///
/// Text without a recognizable operator becomes `field = ""`.
pub fn parse_condition(text: &str) -> Condition {
    let raw = text.trim();
    if raw.is_empty() {
        return Condition {
            field: String::new(),
            operator: Operator::Eq,
            value: String::new(),
            raw: String::new(),
        };
    }

    let mut rewritten = raw.to_owned();
    for (phrase, symbol) in PHRASES {
        rewritten = replace_case_insensitive(&rewritten, phrase, symbol);
    }

    for (symbol, op) in SYMBOLS {
        if let Some(idx) = rewritten.find(symbol) {
            return Condition {
                field: rewritten[..idx].trim().to_owned(),
                operator: *op,
                value: rewritten[idx + symbol.len()..].trim().to_owned(),
                raw: text.to_owned(),
            };
        }
    }

    let lower = rewritten.to_lowercase();
    for (word, op) in WORDS {
        if let Some((start, end)) = find_word(&lower, word) {
            return Condition {
                field: rewritten[..start].trim().to_owned(),
                operator: *op,
                value: rewritten[end..].trim().to_owned(),
                raw: text.to_owned(),
            };
        }
    }

    Condition {
        field: rewritten,
        operator: Operator::Eq,
        value: String::new(),
        raw: text.to_owned(),
    }
}

/// Evaluate one condition against `context`.
///
/// The field is a dotted path into the context.  Ordering operators compare
/// numerically when both sides parse as numbers, otherwise as strings.
pub fn evaluate_condition(condition: &Condition, context: &Value) -> bool {
    let actual = lookup(context, &condition.field);
    let actual_text = actual.map(value_text).unwrap_or_else(|| "undefined".into());
    let expected = condition.value.as_str();

    let ordering = || match (leading_number(&actual_text), leading_number(expected)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => Some(actual_text.as_str().cmp(expected)),
    };

    match condition.operator {
        Operator::Gt => ordering() == Some(Ordering::Greater),
        Operator::Lt => ordering() == Some(Ordering::Less),
        Operator::Ge => matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)),
        Operator::Le => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
        Operator::Eq => actual_text == expected,
        Operator::Ne => actual_text != expected,
        Operator::Contains => actual_text.contains(expected),
        Operator::NotContains => !actual_text.contains(expected),
    }
}

/// Evaluate a rule set, recording the outcome of every rule.
pub fn evaluate_rule_set(rules: &RuleSet, context: &Value) -> RuleSetResult {
    let mut details = Vec::with_capacity(rules.all.len() + rules.any.len());

    let mut passed_all = true;
    for rule in &rules.all {
        let condition = rule.to_condition();
        let result = evaluate_condition(&condition, context);
        passed_all &= result;
        details.push(RuleDetail {
            condition,
            result,
            mode: RuleMode::All,
        });
    }

    let mut passed_any = rules.any.is_empty();
    for rule in &rules.any {
        let condition = rule.to_condition();
        let result = evaluate_condition(&condition, context);
        passed_any |= result;
        details.push(RuleDetail {
            condition,
            result,
            mode: RuleMode::Any,
        });
    }

    RuleSetResult {
        passed: passed_all && passed_any,
        details,
    }
}

fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.')
        .try_fold(context, |node, key| node.as_object()?.get(key))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse the numeric prefix of `text` (`"12kg"` → 12).
fn leading_number(text: &str) -> Option<f64> {
    let text = text.trim_start();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    for (i, c) in text.char_indices() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            '-' | '+' if i == 0 => {}
            _ => break,
        }
        end = i + c.len_utf8();
    }
    if !seen_digit {
        return None;
    }
    text[..end].parse().ok()
}

fn replace_case_insensitive(haystack: &str, needle: &str, replacement: &str) -> String {
    let lower = haystack.to_lowercase();
    // Lowercasing can change byte lengths; only rewrite when it did not.
    if lower.len() != haystack.len() {
        return haystack.replace(needle, replacement);
    }
    match lower.find(needle) {
        Some(idx) => format!(
            "{}{}{}",
            &haystack[..idx],
            replacement,
            &haystack[idx + needle.len()..]
        ),
        None => haystack.to_owned(),
    }
}

/// Find `word` in `text` with non-alphanumeric characters (or the text
/// edges) on both sides.
fn find_word(text: &str, word: &str) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(rel) = text[from..].find(word) {
        let start = from + rel;
        let end = start + word.len();
        let before_ok = text[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = text[end..].chars().next().is_none_or(|c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return Some((start, end));
        }
        from = start + word.len();
    }
    None
}

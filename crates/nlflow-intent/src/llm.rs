//! LLM fallback for sentences the heuristic tiers cannot split well.
//!
//! The backend is asked for strict JSON.  Anything that goes wrong (the
//! backend is unreachable, the reply is not JSON, the condition is missing)
//! becomes [`LlmOutcome::Failed`] instead of an error.  Successful results
//! are memoized in a small FIFO cache keyed by the text and the options.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use nlflow_llm::{CompletionBackend, CompletionRequest, Message};

use crate::error::{IntentError, Result};
use crate::grammar::normalize_whitespace;
use crate::lang::Lang;
use crate::normalizer::{NormalizeOptions, NormalizeOutcome, SentenceNormalizer, clean_condition};
use crate::numeric::NumericCondition;
use crate::tiers::Tier;

/// Maximum number of memoized results.
pub const CACHE_CAPACITY: usize = 100;

const LLM_SYSTEM_PROMPT: &str = r#"You extract workflow triggers from one sentence.

Respond ONLY with a JSON object of this exact shape:
{
  "condition": "the trigger clause, without the leading when/if word",
  "actions": ["one imperative action per entry", "..."],
  "language": "ISO 639-3 code of the sentence, e.g. pol, eng, deu",
  "numeric_conditions": [
    {"field": "stock|value", "operator": "<|>|==", "value": 0, "unit": "pieces|percent|items|null"}
  ]
}

Rules:
- Keep the language of the input; fix obvious typos only.
- Use an empty array when there are no numeric thresholds.
- Do not add commentary or markdown."#;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of the LLM fallback.  Never an error.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmOutcome {
    Normalized(Box<NormalizeOutcome>),
    Failed { error: String },
}

impl LlmOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Normalized(_))
    }

    pub fn outcome(&self) -> Option<&NormalizeOutcome> {
        match self {
            Self::Normalized(outcome) => Some(outcome.as_ref()),
            Self::Failed { .. } => None,
        }
    }
}

/// Wire shape: `{"ok": true, ...outcome}` or `{"ok": false, "error": "..."}`.
#[derive(Serialize)]
struct LlmOutcomeWire<'a> {
    ok: bool,
    #[serde(flatten)]
    outcome: Option<&'a NormalizeOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl Serialize for LlmOutcome {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Normalized(outcome) => LlmOutcomeWire {
                ok: true,
                outcome: Some(outcome.as_ref()),
                error: None,
            },
            Self::Failed { error } => LlmOutcomeWire {
                ok: false,
                outcome: None,
                error: Some(error.as_str()),
            },
        };
        wire.serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// FIFO cache
// ---------------------------------------------------------------------------

/// Insertion-ordered cache: once it holds more than `capacity` entries the
/// oldest one is dropped.  Lookups do not refresh an entry.
#[derive(Debug)]
struct FifoCache {
    capacity: usize,
    order: VecDeque<String>,
    entries: HashMap<String, NormalizeOutcome>,
}

impl FifoCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity + 1),
            entries: HashMap::with_capacity(capacity + 1),
        }
    }

    fn get(&self, key: &str) -> Option<NormalizeOutcome> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: String, value: NormalizeOutcome) {
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LlmReply {
    #[serde(default)]
    condition: String,
    #[serde(default)]
    actions: Vec<Value>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    numeric_conditions: Vec<Value>,
}

/// Pull the JSON object out of a possibly fenced or chatty reply.
fn extract_json(text: &str) -> Result<Value> {
    let cleaned = text.trim();
    let cleaned = cleaned.strip_prefix("```json").unwrap_or(cleaned);
    let cleaned = cleaned.strip_prefix("```").unwrap_or(cleaned);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned);
    let cleaned = cleaned.trim();

    let candidate = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => cleaned,
    };
    serde_json::from_str(candidate).map_err(|e| IntentError::Provider {
        reason: format!("failed to parse LLM response as JSON: {e}"),
    })
}

fn parse_reply(text: &str) -> Result<LlmReply> {
    let value = extract_json(text)?;
    let reply: LlmReply = serde_json::from_value(value).map_err(|e| IntentError::Provider {
        reason: format!("unexpected LLM response shape: {e}"),
    })?;
    if reply.condition.trim().is_empty() {
        return Err(IntentError::Provider {
            reason: "LLM parse failed: missing condition".into(),
        });
    }
    Ok(reply)
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// LLM-backed normalizer with a FIFO result cache.
pub struct LlmNormalizer {
    backend: Arc<dyn CompletionBackend>,
    normalizer: Arc<SentenceNormalizer>,
    cache: Mutex<FifoCache>,
}

impl LlmNormalizer {
    pub fn new(backend: Arc<dyn CompletionBackend>, normalizer: Arc<SentenceNormalizer>) -> Self {
        Self::with_capacity(backend, normalizer, CACHE_CAPACITY)
    }

    pub fn with_capacity(
        backend: Arc<dyn CompletionBackend>,
        normalizer: Arc<SentenceNormalizer>,
        capacity: usize,
    ) -> Self {
        Self {
            backend,
            normalizer,
            cache: Mutex::new(FifoCache::new(capacity)),
        }
    }

    /// Number of memoized results.
    pub fn cached(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Normalize `text` through the backend.
    pub async fn normalize(&self, text: &str, options: &NormalizeOptions) -> LlmOutcome {
        let text = normalize_whitespace(text);
        if text.is_empty() {
            return LlmOutcome::Failed {
                error: "sentence is empty".into(),
            };
        }

        let key = cache_key(&text, options);
        let hit = self.cache.lock().ok().and_then(|c| c.get(&key));
        if let Some(hit) = hit {
            debug!(backend = self.backend.name(), "LLM cache hit");
            return LlmOutcome::Normalized(Box::new(hit));
        }

        match self.run(&text, options).await {
            Ok(outcome) => {
                if let Ok(mut cache) = self.cache.lock() {
                    cache.insert(key, outcome.clone());
                }
                info!(
                    backend = self.backend.name(),
                    step_id = %outcome.step.id,
                    "sentence normalized via LLM"
                );
                LlmOutcome::Normalized(Box::new(outcome))
            }
            Err(e) => {
                warn!(backend = self.backend.name(), error = %e, "LLM normalization failed");
                LlmOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn run(&self, text: &str, options: &NormalizeOptions) -> Result<NormalizeOutcome> {
        let hint = match options.lang {
            Some(lang) => format!("Language hint: {lang}\n"),
            None => String::new(),
        };
        let request = CompletionRequest {
            model: options.model.clone().unwrap_or_default(),
            messages: vec![
                Message::system(LLM_SYSTEM_PROMPT),
                Message::user(format!("{hint}Sentence: {text}")),
            ],
            temperature: Some(0.0),
            max_tokens: Some(512),
            json_mode: true,
        };

        let raw = self.backend.complete(&request).await?;
        let reply = parse_reply(&raw)?;

        let condition = clean_condition(&reply.condition);
        let actions: Vec<String> = reply
            .actions
            .iter()
            .map(|a| match a {
                Value::String(s) => normalize_whitespace(s),
                other => normalize_whitespace(&other.to_string()),
            })
            .filter(|a| !a.is_empty())
            .collect();

        let lang = reply
            .language
            .as_deref()
            .map(|code| code.parse::<Lang>().unwrap_or_default())
            .filter(|l| *l != Lang::Und)
            .or(options.lang)
            .unwrap_or_else(|| Lang::detect(text));

        let mut numeric: Vec<NumericCondition> = reply
            .numeric_conditions
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();
        if numeric.is_empty() {
            numeric = self
                .normalizer
                .extract_numeric(&format!("{condition} {}", actions.join(" ")));
        }

        Ok(self
            .normalizer
            .finish(condition, actions, numeric, Tier::Llm, lang, true))
    }
}

/// Stable cache key for `(text, options)`.
fn cache_key(text: &str, options: &NormalizeOptions) -> String {
    serde_json::to_string(&(text, options)).unwrap_or_else(|_| text.to_owned())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

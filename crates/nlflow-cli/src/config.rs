//! Runtime configuration.
//!
//! Read from a TOML file (missing file means defaults), then overridden by
//! environment variables.  `.env` is loaded by `main` before this runs.
//!
//! ```toml
//! data_dir = "data"
//! history_max = 100
//! log_level = "info"
//! classifier = "config/modules.json"
//!
//! [llm]
//! enabled = true
//! provider = "ollama"
//! model = "mistral"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use nlflow_engine::DEFAULT_HISTORY_SIZE;
use nlflow_llm::{LlmClientConfig, LlmProvider, OLLAMA_BASE_URL, OLLAMA_DEFAULT_MODEL};

pub const DEFAULT_CONFIG_PATH: &str = "config/nlflow.toml";

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NlflowConfig {
    /// Directory holding `nlflow.db`.
    pub data_dir: PathBuf,
    /// Undo/redo depth.
    pub history_max: usize,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub log_level: String,
    /// Optional classifier module table (JSON, as written by
    /// `ModuleClassifier::export_config`).
    pub classifier: Option<PathBuf>,
    pub llm: LlmSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// Fall back to the LLM when the heuristic tiers fail.
    pub enabled: bool,
    /// `openai` or `ollama`.
    pub provider: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

impl Default for NlflowConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            history_max: DEFAULT_HISTORY_SIZE,
            log_level: "info".into(),
            classifier: None,
            llm: LlmSection::default(),
        }
    }
}

impl NlflowConfig {
    /// Load `path` and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(env_non_empty);
        Ok(config)
    }

    /// Parse `path`; a missing file yields defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => toml::from_str(&text)
                .with_context(|| format!("invalid config file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    /// Apply overrides from `lookup` (the process environment in
    /// production).  Unparseable numbers and booleans are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("NLFLOW_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(max) = lookup("NLFLOW_HISTORY_MAX") {
            match max.parse() {
                Ok(n) => self.history_max = n,
                Err(_) => warn!(value = %max, "ignoring NLFLOW_HISTORY_MAX"),
            }
        }
        if let Some(level) = lookup("NLFLOW_LOG") {
            self.log_level = level;
        }
        if let Some(enabled) = lookup("NLFLOW_LLM_ENABLED") {
            match enabled.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.llm.enabled = true,
                "0" | "false" | "no" | "off" => self.llm.enabled = false,
                _ => warn!(value = %enabled, "ignoring NLFLOW_LLM_ENABLED"),
            }
        }
        if let Some(provider) = lookup("NLFLOW_LLM_PROVIDER") {
            self.llm.provider = Some(provider);
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }

        // Each provider has its own URL variable; only the active one applies.
        let url_var = match self.llm_provider() {
            LlmProvider::Ollama => "LLM_OLLAMA_URL",
            LlmProvider::OpenAI => "OPENAI_BASE_URL",
        };
        if let Some(url) = lookup(url_var) {
            self.llm.base_url = Some(url);
        }
    }

    /// Resolved provider.  Unknown names fall back to Ollama.
    pub fn llm_provider(&self) -> LlmProvider {
        match self.llm.provider.as_deref().map(str::parse::<LlmProvider>) {
            Some(Ok(p)) => p,
            Some(Err(e)) => {
                warn!(error = %e, "falling back to ollama");
                LlmProvider::Ollama
            }
            None => LlmProvider::Ollama,
        }
    }

    /// Client configuration for the selected provider.  `None` when OpenAI
    /// is selected without an API key.
    pub fn llm_client_config(&self) -> Option<LlmClientConfig> {
        match self.llm_provider() {
            LlmProvider::Ollama => Some(LlmClientConfig::ollama(
                self.llm.base_url.as_deref().unwrap_or(OLLAMA_BASE_URL),
                self.llm.model.as_deref().unwrap_or(OLLAMA_DEFAULT_MODEL),
            )),
            LlmProvider::OpenAI => {
                let key = self.llm.api_key.as_deref()?;
                let model = self.llm.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL);
                Some(match &self.llm.base_url {
                    Some(url) => LlmClientConfig::openai_compatible(key, model, url.as_str()),
                    None => LlmClientConfig::openai(key, model),
                })
            }
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("nlflow.db")
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

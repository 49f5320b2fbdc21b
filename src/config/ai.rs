// src/config/ai.rs
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const ENV_AI_CONFIG_PATH: &str = "AI_CONFIG_PATH";
pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

/// Summarizer settings as stored in `config/ai.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    pub enabled: bool,
    /// "openai" | "gemini" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Falls back to the provider default when absent.
    #[serde(default)]
    pub model: Option<String>,
    /// "ENV" means: read from OPENAI_API_KEY / GEMINI_API_KEY (by provider)
    #[serde(default)]
    pub api_key: String,
    /// OpenAI-compatible endpoint root, e.g. `https://api.openai.com/v1`.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            model: None,
            api_key: String::new(),
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Fully resolved settings for the HTTP summarizer.
#[derive(Debug, Clone)]
pub struct ResolvedSummarizer {
    pub provider: String,
    pub model: String,
    pub api_key: SecretString,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl SummarizerConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut cfg: SummarizerConfig = serde_json::from_str(&data)?;
        cfg.provider = cfg.provider.trim().to_lowercase();
        Ok(cfg)
    }

    /// `AI_CONFIG_PATH`, then `config/ai.json`. A missing file means disabled.
    pub fn load_default() -> anyhow::Result<Self> {
        let path = env::var(ENV_AI_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_AI_CONFIG_PATH.into());
        if Path::new(&path).exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// `None` when disabled. Errors on unknown providers or a missing key.
    pub fn resolve(&self) -> anyhow::Result<Option<ResolvedSummarizer>> {
        if !self.enabled {
            return Ok(None);
        }
        let (env_key, default_model, default_base) = match self.provider.as_str() {
            "openai" => ("OPENAI_API_KEY", "gpt-4o-mini", "https://api.openai.com/v1"),
            "gemini" => (
                "GEMINI_API_KEY",
                "gemini-2.0-flash",
                "https://generativelanguage.googleapis.com/v1beta/openai",
            ),
            other => anyhow::bail!("Unsupported provider in config: {other}"),
        };

        let api_key = if self.api_key.trim().eq_ignore_ascii_case("env") {
            env::var(env_key).map_err(|_| anyhow::anyhow!("Missing {env_key} env var"))?
        } else {
            self.api_key.trim().to_string()
        };
        if api_key.is_empty() {
            anyhow::bail!("Empty api_key for provider {}", self.provider);
        }

        Ok(Some(ResolvedSummarizer {
            provider: self.provider.clone(),
            model: self.model.clone().unwrap_or_else(|| default_model.to_string()),
            api_key: SecretString::from(api_key),
            base_url: self
                .base_url
                .clone()
                .unwrap_or_else(|| default_base.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout_secs: self.timeout_secs.max(1),
        }))
    }
}

// src/config/mod.rs
//! Run configuration. Core components receive these values by field; only this
//! module touches files and the environment.

pub mod ai;

use anyhow::Context;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::error::ConfigError;
use crate::ingest::SourceKind;

pub const ENV_BRIEFING_CONFIG_PATH: &str = "BRIEFING_CONFIG_PATH";
pub const DEFAULT_BRIEFING_CONFIG_PATH: &str = "config/briefing.toml";
const SLACK_TOKEN_PREFIX: &str = "SLACK_TOKEN_";

fn default_lookback_hours() -> u32 {
    24
}
fn default_source_timeout_secs() -> u64 {
    60
}
fn default_fetch_attempts() -> u32 {
    3
}
fn default_body_max_chars() -> usize {
    1500
}
fn default_batch_max_messages() -> usize {
    200
}
fn default_batch_max_chars() -> usize {
    60_000
}
fn default_summarize_attempts() -> u32 {
    2
}
fn default_output_dir() -> String {
    "~/gh".to_string()
}
fn default_slack_history_limit() -> u32 {
    20
}
fn default_slack_channel_limit() -> u32 {
    100
}
fn default_telegram_dialog_limit() -> usize {
    20
}
fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceToggles {
    #[serde(default = "yes")]
    pub gmail: bool,
    #[serde(default = "yes")]
    pub slack: bool,
    #[serde(default = "yes")]
    pub telegram: bool,
}

impl Default for SourceToggles {
    fn default() -> Self {
        Self {
            gmail: true,
            slack: true,
            telegram: true,
        }
    }
}

impl SourceToggles {
    pub fn is_enabled(&self, kind: SourceKind) -> bool {
        match kind {
            SourceKind::Gmail => self.gmail,
            SourceKind::Slack => self.slack,
            SourceKind::Telegram => self.telegram,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BriefingConfig {
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u32,
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,
    #[serde(default = "default_body_max_chars")]
    pub body_max_chars: usize,
    #[serde(default = "default_batch_max_messages")]
    pub batch_max_messages: usize,
    #[serde(default = "default_batch_max_chars")]
    pub batch_max_chars: usize,
    #[serde(default = "default_summarize_attempts")]
    pub summarize_attempts: u32,
    /// `~/` is expanded against the home directory.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default)]
    pub sources: SourceToggles,
    #[serde(default = "default_slack_history_limit")]
    pub slack_history_limit: u32,
    #[serde(default = "default_slack_channel_limit")]
    pub slack_channel_limit: u32,
    #[serde(default = "default_telegram_dialog_limit")]
    pub telegram_dialog_limit: usize,
}

impl Default for BriefingConfig {
    fn default() -> Self {
        Self {
            lookback_hours: default_lookback_hours(),
            source_timeout_secs: default_source_timeout_secs(),
            fetch_attempts: default_fetch_attempts(),
            body_max_chars: default_body_max_chars(),
            batch_max_messages: default_batch_max_messages(),
            batch_max_chars: default_batch_max_chars(),
            summarize_attempts: default_summarize_attempts(),
            output_dir: default_output_dir(),
            sources: SourceToggles::default(),
            slack_history_limit: default_slack_history_limit(),
            slack_channel_limit: default_slack_channel_limit(),
            telegram_dialog_limit: default_telegram_dialog_limit(),
        }
    }
}

impl BriefingConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)?;
        let cfg: BriefingConfig = toml::from_str(&data).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// `explicit` (the `--config` flag) must exist. Otherwise `BRIEFING_CONFIG_PATH`,
    /// then `config/briefing.toml`; a missing default file means defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(p) = explicit {
            return Self::load_from_file(p);
        }
        if let Ok(p) = env::var(ENV_BRIEFING_CONFIG_PATH) {
            return Self::load_from_file(p);
        }
        let default = Path::new(DEFAULT_BRIEFING_CONFIG_PATH);
        if default.exists() {
            Self::load_from_file(default)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("lookback_hours", self.lookback_hours as usize),
            ("source_timeout_secs", self.source_timeout_secs as usize),
            ("body_max_chars", self.body_max_chars),
            ("batch_max_messages", self.batch_max_messages),
            ("batch_max_chars", self.batch_max_chars),
        ];
        for (key, v) in positive {
            if v == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than zero".into(),
                });
            }
        }
        Ok(())
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.lookback_hours))
    }

    pub fn output_dir(&self) -> PathBuf {
        expand_home(&self.output_dir)
    }

    /// Intersection of the CLI selection with the config toggles.
    pub fn enabled_sources(&self, selected: &BTreeSet<SourceKind>) -> BTreeSet<SourceKind> {
        selected
            .iter()
            .copied()
            .filter(|k| self.sources.is_enabled(*k))
            .collect()
    }
}

pub fn expand_home(p: &str) -> PathBuf {
    match p.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| PathBuf::from(p)),
        None if p == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from(p)),
        None => PathBuf::from(p),
    }
}

/// Externally managed credentials. Nothing here refreshes or validates a token.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// `(workspace label, token)`, sorted by label.
    pub slack: Vec<(String, SecretString)>,
    pub telegram: Option<SecretString>,
    pub gmail: Option<SecretString>,
}

impl Credentials {
    pub fn from_env() -> anyhow::Result<Self> {
        let slack = slack_tokens(env::vars());
        let telegram = non_empty_env("TELEGRAM_BOT_TOKEN").map(SecretString::from);
        let gmail = match non_empty_env("GMAIL_ACCESS_TOKEN") {
            Some(t) => Some(SecretString::from(t)),
            None => match gmail_token_path() {
                Some(p) if p.exists() => Some(
                    read_gmail_token(&p)
                        .with_context(|| format!("reading Gmail token {}", p.display()))?,
                ),
                _ => None,
            },
        };
        Ok(Self {
            slack,
            telegram,
            gmail,
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// `SLACK_TOKEN_<LABEL>=xoxb-...` pairs, one workspace each.
pub fn slack_tokens<I>(vars: I) -> Vec<(String, SecretString)>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut out: Vec<(String, SecretString)> = vars
        .into_iter()
        .filter_map(|(k, v)| {
            let label = k.strip_prefix(SLACK_TOKEN_PREFIX)?;
            if label.is_empty() || v.trim().is_empty() {
                return None;
            }
            Some((label.to_string(), SecretString::from(v.trim().to_string())))
        })
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

pub fn gmail_token_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("chief_of_staff").join("token.json"))
}

#[derive(Deserialize)]
struct TokenFile {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

pub fn read_gmail_token(path: &Path) -> anyhow::Result<SecretString> {
    let data = fs::read_to_string(path)?;
    let file: TokenFile = serde_json::from_str(&data)?;
    file.token
        .or(file.access_token)
        .filter(|t| !t.trim().is_empty())
        .map(SecretString::from)
        .ok_or_else(|| anyhow::anyhow!("token file has no token/access_token field"))
}

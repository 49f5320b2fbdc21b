// src/ingest/config.rs
//! Noise rules: data-driven exclusion policy applied by the normalizer.
//!
//! TOML shape:
//! ```toml
//! [[rule]]
//! name = "newsletters"
//! sender = "noreply|no-reply|newsletter"
//!
//! [[rule]]
//! source = "slack"
//! body = "^(thanks|thank you|sounds good)!?$"
//! ```
//! JSON is accepted as `{"rule": [...]}` or a bare array of rules.

use anyhow::{anyhow, Context, Result};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::ingest::types::{Message, SourceKind};

pub const ENV_NOISE_RULES_PATH: &str = "NOISE_RULES_PATH";

/// Rule as written in the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoiseRuleSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub source: Option<SourceKind>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

/// Compiled rule. Matches when every present pattern matches.
#[derive(Debug, Clone)]
pub struct NoiseRule {
    pub name: String,
    source: Option<SourceKind>,
    sender: Option<Regex>,
    subject: Option<Regex>,
    body: Option<Regex>,
    context: Option<Regex>,
}

impl NoiseRule {
    pub fn compile(spec: &NoiseRuleSpec, index: usize) -> Result<Self, ConfigError> {
        let name = spec
            .name
            .clone()
            .unwrap_or_else(|| format!("rule#{index}"));
        let build = |field: &str, pat: &Option<String>| -> Result<Option<Regex>, ConfigError> {
            pat.as_deref()
                .map(|p| {
                    RegexBuilder::new(p)
                        .case_insensitive(true)
                        .build()
                        .map_err(|e| ConfigError::InvalidValue {
                            key: format!("{name}.{field}"),
                            message: e.to_string(),
                        })
                })
                .transpose()
        };
        Ok(Self {
            source: spec.source,
            sender: build("sender", &spec.sender)?,
            subject: build("subject", &spec.subject)?,
            body: build("body", &spec.body)?,
            context: build("context", &spec.context)?,
            name,
        })
    }

    fn has_patterns(&self) -> bool {
        self.sender.is_some() || self.subject.is_some() || self.body.is_some() || self.context.is_some()
    }

    pub fn matches(&self, m: &Message) -> bool {
        if !self.has_patterns() {
            return false;
        }
        if self.source.is_some_and(|s| s != m.source) {
            return false;
        }
        let hit = |re: &Option<Regex>, text: &str| re.as_ref().map_or(true, |r| r.is_match(text));
        hit(&self.sender, &m.sender)
            && hit(&self.subject, m.subject.as_deref().unwrap_or_default())
            && hit(&self.body, &m.body)
            && hit(&self.context, &m.context)
    }
}

/// Set of exclusion rules. Empty policy drops nothing.
#[derive(Debug, Clone, Default)]
pub struct NoisePolicy {
    rules: Vec<NoiseRule>,
}

impl NoisePolicy {
    pub fn from_specs(specs: &[NoiseRuleSpec]) -> Result<Self, ConfigError> {
        let rules = specs
            .iter()
            .enumerate()
            .map(|(i, s)| NoiseRule::compile(s, i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Name of the first rule that matches, if any.
    pub fn matching_rule(&self, m: &Message) -> Option<&str> {
        self.rules.iter().find(|r| r.matches(m)).map(|r| r.name.as_str())
    }

    pub fn is_noise(&self, m: &Message) -> bool {
        self.matching_rule(m).is_some()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Load noise rules from an explicit path. Supports TOML or JSON formats.
pub fn load_noise_rules_from(path: &Path) -> Result<NoisePolicy> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading noise rules from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let specs = parse_rules(&content, ext.as_str())
        .with_context(|| format!("parsing noise rules in {}", path.display()))?;
    Ok(NoisePolicy::from_specs(&specs)?)
}

/// Load noise rules using env var + fallbacks:
/// 1) $NOISE_RULES_PATH
/// 2) config/noise_rules.toml
/// 3) config/noise_rules.json
pub fn load_noise_rules_default() -> Result<NoisePolicy> {
    if let Ok(p) = std::env::var(ENV_NOISE_RULES_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_noise_rules_from(&pb);
        } else {
            return Err(anyhow!("NOISE_RULES_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/noise_rules.toml");
    if toml_p.exists() {
        return load_noise_rules_from(&toml_p);
    }
    let json_p = PathBuf::from("config/noise_rules.json");
    if json_p.exists() {
        return load_noise_rules_from(&json_p);
    }
    Ok(NoisePolicy::default())
}

fn parse_rules(s: &str, hint_ext: &str) -> Result<Vec<NoiseRuleSpec>> {
    // Try TOML first if hinted or content looks like toml.
    let try_toml = hint_ext == "toml" || s.contains("[[rule]]");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    // Fallback: also try TOML if not attempted
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported noise rules format"))
}

#[derive(Deserialize)]
struct RulesFile {
    #[serde(default)]
    rule: Vec<NoiseRuleSpec>,
}

fn parse_toml(s: &str) -> Result<Vec<NoiseRuleSpec>> {
    let v: RulesFile = toml::from_str(s)?;
    Ok(v.rule)
}

fn parse_json(s: &str) -> Result<Vec<NoiseRuleSpec>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum JsonRules {
        Wrapped(RulesFile),
        Bare(Vec<NoiseRuleSpec>),
    }
    let v: JsonRules = serde_json::from_str(s)?;
    Ok(match v {
        JsonRules::Wrapped(f) => f.rule,
        JsonRules::Bare(v) => v,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::{env, fs};

    fn msg(source: SourceKind, sender: &str, body: &str) -> Message {
        Message {
            source,
            source_ref: "r".into(),
            sender: sender.into(),
            timestamp: Utc::now(),
            subject: None,
            body: body.into(),
            context: String::new(),
        }
    }

    #[test]
    fn toml_and_json_formats_work() {
        let toml = r#"
[[rule]]
name = "bots"
sender = "noreply"

[[rule]]
source = "slack"
body = "^thanks$"
"#;
        let t = parse_toml(toml).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t[1].source, Some(SourceKind::Slack));

        let bare = r#"[{"sender": "jira@"}]"#;
        assert_eq!(parse_json(bare).unwrap().len(), 1);
        let wrapped = r#"{"rule": [{"body": "unsubscribe"}, {"context": "alerts"}]}"#;
        assert_eq!(parse_json(wrapped).unwrap().len(), 2);
    }

    #[test]
    fn rule_requires_all_present_patterns() {
        let spec = NoiseRuleSpec {
            source: Some(SourceKind::Slack),
            body: Some("^thanks$".into()),
            ..Default::default()
        };
        let p = NoisePolicy::from_specs(&[spec]).unwrap();
        assert!(p.is_noise(&msg(SourceKind::Slack, "bob", "Thanks")));
        assert!(!p.is_noise(&msg(SourceKind::Telegram, "bob", "thanks")));
        assert!(!p.is_noise(&msg(SourceKind::Slack, "bob", "thanks, will review")));
    }

    #[test]
    fn empty_rule_never_matches() {
        let p = NoisePolicy::from_specs(&[NoiseRuleSpec::default()]).unwrap();
        assert!(!p.is_noise(&msg(SourceKind::Gmail, "x", "y")));
    }

    #[test]
    fn invalid_regex_is_a_config_error() {
        let spec = NoiseRuleSpec {
            name: Some("broken".into()),
            sender: Some("(".into()),
            ..Default::default()
        };
        let err = NoisePolicy::from_specs(&[spec]).unwrap_err();
        assert!(err.to_string().contains("broken.sender"));
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();

        env::remove_var(ENV_NOISE_RULES_PATH);

        // No files in the temp CWD -> empty policy
        let p = load_noise_rules_default().unwrap();
        assert!(p.is_empty());

        // Env wins
        let p_json = tmp.path().join("rules.json");
        fs::write(&p_json, r#"[{"sender": "newsletter"}]"#).unwrap();
        env::set_var(ENV_NOISE_RULES_PATH, p_json.display().to_string());
        let p2 = load_noise_rules_default().unwrap();
        assert_eq!(p2.len(), 1);
        env::remove_var(ENV_NOISE_RULES_PATH);

        env::set_current_dir(&old).unwrap();
    }
}

// src/ingest/providers/slack.rs
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use metrics::counter;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use super::{http_client, retry_after, DEFAULT_FETCH_ATTEMPTS};
use crate::error::SourceError;
use crate::ingest::clean_text;
use crate::ingest::types::{dedup_by_ref, Message, SourceAdapter, SourceKind, SourceResult};
use crate::retry::with_retries;

pub const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";
pub const DEFAULT_HISTORY_LIMIT: u32 = 20;
pub const DEFAULT_CHANNEL_LIMIT: u32 = 100;
const CONVERSATION_TYPES: &str = "public_channel,private_channel,im,mpim";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackConversation {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_normalized: Option<String>,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_im: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackMessage {
    pub ts: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Slack Web API calls used by the adapter.
#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn list_conversations(&self, limit: u32) -> Result<Vec<SlackConversation>, SourceError>;
    async fn history(
        &self,
        channel: &str,
        oldest: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SlackMessage>, SourceError>;
    async fn user_name(&self, user: &str) -> Result<String, SourceError>;
}

/// Map a Slack `error` string from an `ok: false` envelope.
pub fn classify_slack_error(code: &str) -> SourceError {
    match code {
        "invalid_auth" | "not_authed" | "token_revoked" | "account_inactive" | "token_expired" => {
            SourceError::Auth(code.to_string())
        }
        "ratelimited" => SourceError::RateLimited { retry_after: None },
        "internal_error" | "fatal_error" | "service_unavailable" | "request_timeout" => {
            SourceError::Transient(code.to_string())
        }
        other => SourceError::Parse(format!("slack api error: {other}")),
    }
}

pub struct SlackHttpClient {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl SlackHttpClient {
    pub fn new(token: SecretString) -> Self {
        let base_url = std::env::var("SLACK_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_SLACK_API_BASE.to_string());
        Self {
            http: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Point the client at another server (local stubs, proxies).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn call(&self, method: &str, query: &[(&str, String)]) -> Result<serde_json::Value, SourceError> {
        let resp = self
            .http
            .get(format!("{}/{}", self.base_url, method))
            .bearer_auth(self.token.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(&e))?;
        let status = resp.status();
        let wait = retry_after(resp.headers());
        if !status.is_success() {
            return Err(SourceError::from_status(status, wait));
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("slack {method}: {e}")))?;
        if body.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let code = body.get("error").and_then(|v| v.as_str()).unwrap_or("unknown_error");
            return Err(match classify_slack_error(code) {
                SourceError::RateLimited { .. } => SourceError::RateLimited { retry_after: wait },
                e => e,
            });
        }
        Ok(body)
    }
}

/// Array field of a response, decoded item by item. Malformed items are dropped and
/// counted; only a missing or non-array field fails the call.
fn items<T: serde::de::DeserializeOwned>(
    body: &mut serde_json::Value,
    key: &str,
) -> Result<Vec<T>, SourceError> {
    let raw = match body.get_mut(key).map(serde_json::Value::take) {
        Some(serde_json::Value::Array(v)) => v,
        Some(serde_json::Value::Null) | None => Vec::new(),
        Some(_) => return Err(SourceError::Parse(format!("slack field {key}: not an array"))),
    };
    let mut out = Vec::with_capacity(raw.len());
    for item in raw {
        match serde_json::from_value(item) {
            Ok(v) => out.push(v),
            Err(e) => {
                tracing::warn!(target: "ingest", source = "slack", field = key, error = %e, "dropping malformed item");
                counter!("briefing_items_dropped_total", "source" => "slack").increment(1);
            }
        }
    }
    Ok(out)
}

#[async_trait]
impl SlackApi for SlackHttpClient {
    async fn list_conversations(&self, limit: u32) -> Result<Vec<SlackConversation>, SourceError> {
        let mut body = self
            .call(
                "conversations.list",
                &[
                    ("types", CONVERSATION_TYPES.to_string()),
                    ("limit", limit.to_string()),
                    ("exclude_archived", "true".to_string()),
                ],
            )
            .await?;
        items(&mut body, "channels")
    }

    async fn history(
        &self,
        channel: &str,
        oldest: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SlackMessage>, SourceError> {
        let oldest = format!("{}.{:06}", oldest.timestamp(), oldest.timestamp_subsec_micros());
        let mut body = self
            .call(
                "conversations.history",
                &[
                    ("channel", channel.to_string()),
                    ("oldest", oldest),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        items(&mut body, "messages")
    }

    async fn user_name(&self, user: &str) -> Result<String, SourceError> {
        let body = self.call("users.info", &[("user", user.to_string())]).await?;
        let u = &body["user"];
        let name = [
            &u["profile"]["display_name"],
            &u["real_name"],
            &u["name"],
        ]
        .into_iter()
        .filter_map(|v| v.as_str())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(user);
        Ok(name.to_string())
    }
}

/// Slack `ts` ("1700000000.123456") to a UTC instant.
pub fn parse_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = ts.split_once('.').unwrap_or((ts, "0"));
    let secs: i64 = secs.parse().ok()?;
    let micros: u32 = format!("{frac:0<6}").get(..6)?.parse().ok()?;
    Utc.timestamp_opt(secs, micros * 1_000).single()
}

/// One adapter per workspace token.
pub struct SlackAdapter {
    workspace: String,
    api: Arc<dyn SlackApi>,
    history_limit: u32,
    channel_limit: u32,
    attempts: u32,
}

impl SlackAdapter {
    pub fn new(workspace: impl Into<String>, api: Arc<dyn SlackApi>) -> Self {
        Self {
            workspace: workspace.into(),
            api,
            history_limit: DEFAULT_HISTORY_LIMIT,
            channel_limit: DEFAULT_CHANNEL_LIMIT,
            attempts: DEFAULT_FETCH_ATTEMPTS,
        }
    }

    pub fn with_limits(mut self, channel_limit: u32, history_limit: u32) -> Self {
        self.channel_limit = channel_limit;
        self.history_limit = history_limit;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    fn context_for(&self, conv: &SlackConversation) -> String {
        if conv.is_im {
            return format!("{} DM", self.workspace);
        }
        match conv.name_normalized.as_deref().or(conv.name.as_deref()) {
            Some(name) if !name.is_empty() => format!("{} #{}", self.workspace, name),
            _ => format!("{} DM", self.workspace),
        }
    }

    async fn resolve_user(&self, cache: &mut HashMap<String, String>, user: &str) -> String {
        if let Some(name) = cache.get(user) {
            return name.clone();
        }
        let name = match self.api.user_name(user).await {
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(target: "ingest", workspace = %self.workspace, user, error = %e, "user lookup failed");
                user.to_string()
            }
        };
        cache.insert(user.to_string(), name.clone());
        name
    }
}

#[async_trait]
impl SourceAdapter for SlackAdapter {
    async fn fetch_recent(&self, since: DateTime<Utc>) -> SourceResult {
        let conversations = with_retries("slack conversations.list", self.attempts, || {
            self.api.list_conversations(self.channel_limit)
        })
        .await?;

        let mut names: HashMap<String, String> = HashMap::new();
        let mut out = Vec::new();
        for conv in conversations.iter().filter(|c| !c.is_archived) {
            let history = with_retries("slack conversations.history", self.attempts, || {
                self.api.history(&conv.id, since, self.history_limit)
            })
            .await;
            let history = match history {
                Ok(h) => h,
                Err(e @ SourceError::Auth(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        target: "ingest",
                        workspace = %self.workspace,
                        channel = %conv.id,
                        error = %e,
                        "skipping channel"
                    );
                    continue;
                }
            };

            let context = self.context_for(conv);
            for raw in history {
                let Some(user) = raw.user.as_deref() else {
                    continue;
                };
                let Some(timestamp) = parse_ts(&raw.ts) else {
                    tracing::warn!(target: "ingest", workspace = %self.workspace, ts = %raw.ts, "dropping message with bad ts");
                    counter!("briefing_items_dropped_total", "source" => "slack").increment(1);
                    continue;
                };
                if timestamp < since {
                    continue;
                }
                let sender = self.resolve_user(&mut names, user).await;
                out.push(Message {
                    source: SourceKind::Slack,
                    source_ref: format!("{}:{}", conv.id, raw.ts),
                    sender,
                    timestamp,
                    subject: None,
                    body: clean_text(raw.text.as_deref().unwrap_or_default()),
                    context: context.clone(),
                });
            }
        }
        Ok(dedup_by_ref(out))
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Slack
    }

    fn label(&self) -> String {
        format!("slack:{}", self.workspace)
    }
}

// src/ingest/providers/telegram.rs
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use metrics::counter;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::{http_client, DEFAULT_FETCH_ATTEMPTS};
use crate::error::SourceError;
use crate::ingest::clean_text;
use crate::ingest::types::{dedup_by_ref, Message, SourceAdapter, SourceKind, SourceResult};
use crate::retry::with_retries;

pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_DIALOG_LIMIT: usize = 20;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TgUser {
    #[serde(default)]
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TgChat {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    pub chat: TgChat,
    pub date: i64,
    #[serde(default)]
    pub from: Option<TgUser>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TgUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TgMessage>,
    #[serde(default)]
    pub edited_message: Option<TgMessage>,
    #[serde(default)]
    pub channel_post: Option<TgMessage>,
}

impl TgUpdate {
    fn into_message(self) -> Option<TgMessage> {
        self.edited_message.or(self.message).or(self.channel_post)
    }
}

#[async_trait]
pub trait TelegramApi: Send + Sync {
    async fn get_updates(&self) -> Result<Vec<TgUpdate>, SourceError>;
}

#[derive(Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    result: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<EnvelopeParams>,
}

#[derive(Deserialize)]
struct EnvelopeParams {
    retry_after: Option<u64>,
}

/// Map a Bot API error envelope to a typed failure.
fn classify_envelope(code: Option<u16>, description: &str, retry_after: Option<u64>) -> SourceError {
    match code {
        Some(401) | Some(403) => SourceError::Auth(description.to_string()),
        Some(429) => SourceError::RateLimited {
            retry_after: retry_after.map(Duration::from_secs),
        },
        Some(c) if c >= 500 => SourceError::Transient(description.to_string()),
        _ => SourceError::Parse(format!("telegram error: {description}")),
    }
}

pub struct TelegramHttpClient {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl TelegramHttpClient {
    pub fn new(token: SecretString) -> Self {
        let base_url = std::env::var("TELEGRAM_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_TELEGRAM_API_BASE.to_string());
        Self {
            http: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl TelegramApi for TelegramHttpClient {
    async fn get_updates(&self) -> Result<Vec<TgUpdate>, SourceError> {
        let url = format!("{}/bot{}/getUpdates", self.base_url, self.token.expose_secret());
        let resp = self
            .http
            .get(url)
            .query(&[(
                "allowed_updates",
                r#"["message","edited_message","channel_post"]"#,
            )])
            .send()
            .await
            // The URL embeds the token; keep it out of the error text.
            .map_err(|e| SourceError::from_reqwest(&e.without_url()))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| SourceError::from_reqwest(&e.without_url()))?;
        let env: Envelope = match serde_json::from_str(&text) {
            Ok(env) => env,
            Err(_) if !status.is_success() => return Err(SourceError::from_status(status, None)),
            Err(e) => return Err(SourceError::Parse(format!("telegram json: {e}"))),
        };
        if !env.ok {
            let retry_after = env.parameters.and_then(|p| p.retry_after);
            return Err(classify_envelope(
                env.error_code.or(Some(status.as_u16())),
                env.description.as_deref().unwrap_or("unknown error"),
                retry_after,
            ));
        }
        Ok(decode_updates(env.result.unwrap_or_default()))
    }
}

/// Decode updates one by one; a malformed update is dropped, not the whole batch.
fn decode_updates(raw: Vec<serde_json::Value>) -> Vec<TgUpdate> {
    let mut out = Vec::with_capacity(raw.len());
    for item in raw {
        match serde_json::from_value::<TgUpdate>(item) {
            Ok(u) => out.push(u),
            Err(e) => {
                tracing::warn!(target: "ingest", source = "telegram", error = %e, "dropping malformed update");
                counter!("briefing_items_dropped_total", "source" => "telegram").increment(1);
            }
        }
    }
    out
}

pub struct TelegramAdapter {
    api: Arc<dyn TelegramApi>,
    dialog_limit: usize,
    attempts: u32,
}

impl TelegramAdapter {
    pub fn new(api: Arc<dyn TelegramApi>) -> Self {
        Self {
            api,
            dialog_limit: DEFAULT_DIALOG_LIMIT,
            attempts: DEFAULT_FETCH_ATTEMPTS,
        }
    }

    pub fn with_dialog_limit(mut self, limit: usize) -> Self {
        self.dialog_limit = limit;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

fn to_message(m: TgMessage) -> Option<Message> {
    let text = m.text.as_deref().map(clean_text).filter(|t| !t.is_empty())?;
    let timestamp = Utc.timestamp_opt(m.date, 0).single()?;
    let sender = m
        .from
        .and_then(|u| u.first_name)
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "Unknown".to_string());
    let context = m
        .chat
        .title
        .or(m.chat.first_name)
        .unwrap_or_else(|| sender.clone());
    Some(Message {
        source: SourceKind::Telegram,
        source_ref: format!("{}:{}", m.chat.id, m.message_id),
        sender,
        timestamp,
        subject: None,
        body: text,
        context,
    })
}

#[async_trait]
impl SourceAdapter for TelegramAdapter {
    async fn fetch_recent(&self, since: DateTime<Utc>) -> SourceResult {
        let mut updates =
            with_retries("telegram getUpdates", self.attempts, || self.api.get_updates()).await?;
        updates.sort_by_key(|u| u.update_id);

        let messages: Vec<Message> = updates
            .into_iter()
            .filter_map(TgUpdate::into_message)
            .filter_map(to_message)
            .filter(|m| m.timestamp >= since)
            .collect();
        // Edits arrive later than the original and replace it.
        let messages = dedup_by_ref(messages);

        // Keep the most recently active chats only.
        let mut latest: HashMap<&str, DateTime<Utc>> = HashMap::new();
        for m in &messages {
            let chat = chat_of(&m.source_ref);
            let e = latest.entry(chat).or_insert(m.timestamp);
            *e = (*e).max(m.timestamp);
        }
        let mut chats: Vec<(&str, DateTime<Utc>)> = latest.into_iter().collect();
        chats.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let keep: Vec<String> = chats
            .into_iter()
            .take(self.dialog_limit)
            .map(|(c, _)| c.to_string())
            .collect();

        Ok(messages
            .into_iter()
            .filter(|m| keep.iter().any(|c| c == chat_of(&m.source_ref)))
            .collect())
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Telegram
    }
}

fn chat_of(source_ref: &str) -> &str {
    source_ref.split_once(':').map(|(c, _)| c).unwrap_or(source_ref)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeTelegram(Result<Vec<TgUpdate>, SourceError>);

    #[async_trait]
    impl TelegramApi for FakeTelegram {
        async fn get_updates(&self) -> Result<Vec<TgUpdate>, SourceError> {
            self.0.clone()
        }
    }

    fn updates(json: &str) -> Vec<TgUpdate> {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn maps_updates_and_prefers_edits() {
        let fake = FakeTelegram(Ok(updates(
            r#"[
            {"update_id": 1, "message": {"message_id": 10, "date": 1700000100,
                "chat": {"id": 42, "title": "Ops"}, "from": {"first_name": "Ana"}, "text": "first"}},
            {"update_id": 2, "edited_message": {"message_id": 10, "date": 1700000100,
                "chat": {"id": 42, "title": "Ops"}, "from": {"first_name": "Ana"}, "text": "fixed"}},
            {"update_id": 3, "message": {"message_id": 11, "date": 1700000200,
                "chat": {"id": 7, "first_name": "Bo"}, "text": "hi"}},
            {"update_id": 4, "message": {"message_id": 12, "date": 1600000000,
                "chat": {"id": 7}, "text": "old"}},
            {"update_id": 5, "message": {"message_id": 13, "date": 1700000300,
                "chat": {"id": 7}}}
        ]"#,
        )));
        let adapter = TelegramAdapter::new(Arc::new(fake));
        let out = adapter
            .fetch_recent(Utc.timestamp_opt(1_700_000_000, 0).unwrap())
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        let ops = out.iter().find(|m| m.source_ref == "42:10").unwrap();
        assert_eq!(ops.body, "fixed");
        assert_eq!(ops.sender, "Ana");
        assert_eq!(ops.context, "Ops");
        let dm = out.iter().find(|m| m.source_ref == "7:11").unwrap();
        assert_eq!(dm.sender, "Unknown");
        assert_eq!(dm.context, "Bo");
    }

    #[tokio::test]
    async fn dialog_limit_keeps_most_recent_chats() {
        let fake = FakeTelegram(Ok(updates(
            r#"[
            {"update_id": 1, "message": {"message_id": 1, "date": 1700000100, "chat": {"id": 1}, "text": "a"}},
            {"update_id": 2, "message": {"message_id": 1, "date": 1700000300, "chat": {"id": 2}, "text": "b"}},
            {"update_id": 3, "message": {"message_id": 1, "date": 1700000200, "chat": {"id": 3}, "text": "c"}}
        ]"#,
        )));
        let adapter = TelegramAdapter::new(Arc::new(fake)).with_dialog_limit(2);
        let out = adapter
            .fetch_recent(Utc.timestamp_opt(1_700_000_000, 0).unwrap())
            .await
            .unwrap();
        let mut refs: Vec<_> = out.iter().map(|m| m.source_ref.as_str()).collect();
        refs.sort();
        assert_eq!(refs, vec!["2:1", "3:1"]);
    }

    #[test]
    fn malformed_update_is_dropped_alone() {
        let raw: Vec<serde_json::Value> = serde_json::from_str(
            r#"[
            {"update_id": 1, "message": {"message_id": 10, "date": 1700000100,
                "chat": {"id": 42, "title": "Ops"}, "text": "kept"}},
            {"update_id": "two", "message": {"chat": null}},
            {"update_id": 3, "message": {"message_id": 11, "date": 1700000200,
                "chat": {"id": 42, "title": "Ops"}, "text": "also kept"}}
        ]"#,
        )
        .unwrap();
        let ids: Vec<i64> = decode_updates(raw).iter().map(|u| u.update_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn envelope_errors_are_classified() {
        assert!(matches!(
            classify_envelope(Some(401), "Unauthorized", None),
            SourceError::Auth(_)
        ));
        assert_eq!(
            classify_envelope(Some(429), "Too Many Requests", Some(3)),
            SourceError::RateLimited {
                retry_after: Some(Duration::from_secs(3))
            }
        );
        assert!(classify_envelope(Some(502), "Bad Gateway", None).is_retryable());
    }
}

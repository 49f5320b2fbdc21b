// src/ingest/providers/gmail.rs
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use metrics::counter;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use super::{http_client, retry_after, DEFAULT_FETCH_ATTEMPTS};
use crate::error::SourceError;
use crate::ingest::clean_text;
use crate::ingest::types::{dedup_by_ref, Message, SourceAdapter, SourceKind, SourceResult};
use crate::retry::with_retries;

pub const DEFAULT_GMAIL_API_BASE: &str = "https://gmail.googleapis.com";
const MAX_LIST_PAGES: usize = 5;

/// Supplies an already-authenticated OAuth access token. Acquiring and refreshing it
/// happens outside this crate.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<SecretString, SourceError>;
}

/// Token handed over at startup (env var or token file).
pub struct StaticToken(SecretString);

impl StaticToken {
    pub fn new(token: SecretString) -> Self {
        Self(token)
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<SecretString, SourceError> {
        if self.0.expose_secret().trim().is_empty() {
            return Err(SourceError::Auth("empty Gmail access token".into()));
        }
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GmailHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GmailPayload {
    #[serde(default)]
    pub headers: Vec<GmailHeader>,
}

/// Subset of `users.messages.get` (format=metadata).
#[derive(Debug, Clone, Deserialize)]
pub struct GmailMessage {
    pub id: String,
    #[serde(rename = "threadId")]
    pub thread_id: Option<String>,
    #[serde(rename = "internalDate")]
    pub internal_date: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub payload: Option<GmailPayload>,
}

impl GmailMessage {
    fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// Gmail REST surface used by the adapter.
#[async_trait]
pub trait GmailApi: Send + Sync {
    async fn list_message_ids(&self, query: &str) -> Result<Vec<String>, SourceError>;
    async fn get_message(&self, id: &str) -> Result<GmailMessage, SourceError>;
}

pub struct GmailHttpClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl GmailHttpClient {
    pub fn new(tokens: Arc<dyn TokenSource>) -> Self {
        let base_url = std::env::var("GMAIL_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_GMAIL_API_BASE.to_string());
        Self {
            http: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    /// Point the client at another server (local stubs, proxies).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let token = self.tokens.access_token().await?;
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(&e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::from_status(status, retry_after(resp.headers())));
        }
        resp.json::<T>()
            .await
            .map_err(|e| SourceError::Parse(format!("gmail json: {e}")))
    }
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<ListEntry>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ListEntry {
    id: String,
}

#[async_trait]
impl GmailApi for GmailHttpClient {
    async fn list_message_ids(&self, query: &str) -> Result<Vec<String>, SourceError> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        for _ in 0..MAX_LIST_PAGES {
            let mut q = vec![("q", query), ("maxResults", "100")];
            if let Some(t) = page_token.as_deref() {
                q.push(("pageToken", t));
            }
            let page: ListResponse = self.get_json("/gmail/v1/users/me/messages", &q).await?;
            ids.extend(page.messages.into_iter().map(|m| m.id));
            match page.next_page_token {
                Some(t) => page_token = Some(t),
                None => break,
            }
        }
        Ok(ids)
    }

    async fn get_message(&self, id: &str) -> Result<GmailMessage, SourceError> {
        self.get_json(
            &format!("/gmail/v1/users/me/messages/{id}"),
            &[
                ("format", "metadata"),
                ("metadataHeaders", "Subject"),
                ("metadataHeaders", "From"),
                ("metadataHeaders", "Date"),
            ],
        )
        .await
    }
}

fn parse_timestamp(m: &GmailMessage) -> Option<DateTime<Utc>> {
    if let Some(ms) = m.internal_date.as_deref().and_then(|s| s.trim().parse::<i64>().ok()) {
        if let Some(dt) = Utc.timestamp_millis_opt(ms).single() {
            return Some(dt);
        }
    }
    let raw = m.header("Date")?;
    let odt = OffsetDateTime::parse(raw.trim(), &Rfc2822).ok()?;
    Utc.timestamp_opt(odt.unix_timestamp(), odt.nanosecond()).single()
}

/// Map one Gmail message into the canonical model.
pub fn to_message(m: &GmailMessage) -> Result<Message, SourceError> {
    let timestamp = parse_timestamp(m)
        .ok_or_else(|| SourceError::Parse(format!("gmail message {} has no usable date", m.id)))?;
    let subject = m
        .header("Subject")
        .map(clean_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "(No Subject)".to_string());
    let sender = m.header("From").map(str::trim).unwrap_or("Unknown").to_string();
    Ok(Message {
        source: SourceKind::Gmail,
        source_ref: m.thread_id.clone().unwrap_or_else(|| m.id.clone()),
        sender,
        timestamp,
        subject: Some(subject),
        body: clean_text(m.snippet.as_deref().unwrap_or_default()),
        context: "Inbox".to_string(),
    })
}

pub struct GmailAdapter {
    api: Arc<dyn GmailApi>,
    attempts: u32,
}

impl GmailAdapter {
    pub fn new(api: Arc<dyn GmailApi>) -> Self {
        Self {
            api,
            attempts: DEFAULT_FETCH_ATTEMPTS,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

#[async_trait]
impl SourceAdapter for GmailAdapter {
    async fn fetch_recent(&self, since: DateTime<Utc>) -> SourceResult {
        let query = format!("after:{}", since.timestamp());
        let ids = with_retries("gmail list", self.attempts, || self.api.list_message_ids(&query)).await?;

        let mut out = Vec::with_capacity(ids.len());
        for id in &ids {
            let raw = match with_retries("gmail get", self.attempts, || self.api.get_message(id)).await {
                Ok(raw) => raw,
                Err(SourceError::Parse(reason)) => {
                    tracing::warn!(target: "ingest", source = "gmail", id = %id, %reason, "dropping unparseable message");
                    counter!("briefing_items_dropped_total", "source" => "gmail").increment(1);
                    continue;
                }
                Err(e) => return Err(e),
            };
            match to_message(&raw) {
                Ok(m) if m.timestamp >= since => out.push(m),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(target: "ingest", source = "gmail", id = %id, error = %e, "dropping message");
                    counter!("briefing_items_dropped_total", "source" => "gmail").increment(1);
                }
            }
        }

        // Threads collapse to their newest message.
        out.sort_by_key(|m| m.timestamp);
        Ok(dedup_by_ref(out))
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Gmail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn raw(json: &str) -> GmailMessage {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn maps_headers_snippet_and_internal_date() {
        let m = raw(r#"{
            "id": "m1", "threadId": "t1", "internalDate": "1700000000000",
            "snippet": "Can you review &quot;Q3 plan&quot;?",
            "payload": {"headers": [
                {"name": "From", "value": "Dana <dana@example.test>"},
                {"name": "Subject", "value": "Q3 plan"}
            ]}
        }"#);
        let msg = to_message(&m).unwrap();
        assert_eq!(msg.source_ref, "t1");
        assert_eq!(msg.sender, "Dana <dana@example.test>");
        assert_eq!(msg.subject.as_deref(), Some("Q3 plan"));
        assert_eq!(msg.body, "Can you review \"Q3 plan\"?");
        assert_eq!(msg.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn falls_back_to_date_header_and_defaults() {
        let m = raw(r#"{
            "id": "m2",
            "payload": {"headers": [{"name": "Date", "value": "Tue, 14 Nov 2023 22:13:20 +0000"}]}
        }"#);
        let msg = to_message(&m).unwrap();
        assert_eq!(msg.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(msg.subject.as_deref(), Some("(No Subject)"));
        assert_eq!(msg.sender, "Unknown");
        assert_eq!(msg.source_ref, "m2");
    }

    #[test]
    fn missing_date_is_a_parse_error() {
        let m = raw(r#"{"id": "m3"}"#);
        assert!(matches!(to_message(&m), Err(SourceError::Parse(_))));
    }

    struct FakeGmail {
        list: Result<Vec<String>, SourceError>,
        messages: HashMap<String, Result<GmailMessage, SourceError>>,
    }

    #[async_trait]
    impl GmailApi for FakeGmail {
        async fn list_message_ids(&self, _query: &str) -> Result<Vec<String>, SourceError> {
            self.list.clone()
        }
        async fn get_message(&self, id: &str) -> Result<GmailMessage, SourceError> {
            self.messages
                .get(id)
                .cloned()
                .unwrap_or_else(|| Err(SourceError::Parse("missing".into())))
        }
    }

    fn entry(id: &str, thread: &str, secs: i64) -> (String, Result<GmailMessage, SourceError>) {
        (
            id.to_string(),
            Ok(raw(&format!(
                r#"{{"id": "{id}", "threadId": "{thread}", "internalDate": "{}", "snippet": "s-{id}"}}"#,
                secs * 1000
            ))),
        )
    }

    #[tokio::test]
    async fn threads_collapse_to_newest_and_bad_items_are_skipped() {
        let api = FakeGmail {
            list: Ok(vec!["a".into(), "b".into(), "c".into(), "d".into()]),
            messages: [
                entry("a", "t1", 1_700_000_300),
                entry("b", "t1", 1_700_000_100),
                entry("c", "t2", 1_700_000_200),
                ("d".to_string(), Err(SourceError::Parse("bad".into()))),
            ]
            .into_iter()
            .collect(),
        };
        let adapter = GmailAdapter::new(Arc::new(api)).with_attempts(1);
        let since = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let out = adapter.fetch_recent(since).await.unwrap();
        assert_eq!(out.len(), 2);
        let t1 = out.iter().find(|m| m.source_ref == "t1").unwrap();
        assert_eq!(t1.body, "s-a");
    }

    #[tokio::test]
    async fn items_older_than_since_are_ignored() {
        let api = FakeGmail {
            list: Ok(vec!["a".into()]),
            messages: [entry("a", "t1", 1_600_000_000)].into_iter().collect(),
        };
        let adapter = GmailAdapter::new(Arc::new(api));
        let out = adapter
            .fetch_recent(Utc.timestamp_opt(1_700_000_000, 0).unwrap())
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn auth_failure_fails_the_adapter() {
        let api = FakeGmail {
            list: Err(SourceError::Auth("token expired".into())),
            messages: HashMap::new(),
        };
        let adapter = GmailAdapter::new(Arc::new(api));
        let err = adapter.fetch_recent(Utc::now()).await.unwrap_err();
        assert!(matches!(err, SourceError::Auth(_)));
    }
}

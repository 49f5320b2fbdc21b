//! Summarization boundary: the request/response shapes and the clients behind the
//! `Summarizer` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::Priority;
use crate::config::ai::{ResolvedSummarizer, SummarizerConfig};
use crate::error::SummarizeError;
use crate::ingest::{Message, SourceKind};

/// One message as the model sees it. `id` is the index within the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub id: usize,
    pub source: SourceKind,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
    pub context: String,
}

impl RequestMessage {
    pub fn from_message(id: usize, m: &Message) -> Self {
        Self {
            id,
            source: m.source,
            sender: m.sender.clone(),
            timestamp: m.timestamp,
            subject: m.subject.clone(),
            body: m.body.clone(),
            context: m.context.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRequest {
    pub batch_index: usize,
    pub batch_count: usize,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Labels of sources that could not be fetched this run.
    pub failed_sources: Vec<String>,
    pub messages: Vec<RequestMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedItem {
    pub priority: Priority,
    pub headline: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub message_ids: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryResponse {
    #[serde(default)]
    pub items: Vec<RankedItem>,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, req: &SummaryRequest) -> Result<SummaryResponse, SummarizeError>;
    /// Provider name for logs.
    fn name(&self) -> &str;
}

const SYSTEM_PROMPT: &str = "You triage a day's worth of messages for one busy person using the \
Eisenhower matrix. You receive JSON with a `messages` array; each message has an integer `id`. \
Drop nothing silently: every id must appear in exactly one item. Group messages about the same \
topic or from the same person into one item. Priorities: \"do_now\" (urgent and important), \
\"schedule\" (important, not urgent), \"delegate\" (urgent, not important), \"clarify\" \
(ambiguous, needs a question back). Answer with one JSON object only: \
{\"items\": [{\"priority\": \"do_now\", \"headline\": \"...\", \"rationale\": \"...\", \
\"action\": \"...\" or null, \"message_ids\": [0, 3]}]}.";

/// Chat Completions client. Works with OpenAI and with Gemini's OpenAI-compatible endpoint.
pub struct OpenAiCompatibleSummarizer {
    http: reqwest::Client,
    provider: String,
    model: String,
    api_key: SecretString,
    base_url: String,
}

impl OpenAiCompatibleSummarizer {
    pub fn new(cfg: ResolvedSummarizer) -> Result<Self, SummarizeError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("chief-of-staff/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| SummarizeError::RequestFailed {
                provider: cfg.provider.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            http,
            provider: cfg.provider,
            model: cfg.model,
            api_key: cfg.api_key,
            base_url: cfg.base_url,
        })
    }

    fn failed(&self, reason: impl Into<String>) -> SummarizeError {
        SummarizeError::RequestFailed {
            provider: self.provider.clone(),
            reason: reason.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatMsg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatReq<'a> {
    model: &'a str,
    messages: Vec<ChatMsg<'a>>,
    temperature: f32,
    response_format: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

/// Parse model output, tolerating a surrounding Markdown code fence.
pub fn parse_response(content: &str) -> Result<SummaryResponse, String> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim()).map_err(|e| e.to_string())
}

#[async_trait]
impl Summarizer for OpenAiCompatibleSummarizer {
    async fn summarize(&self, req: &SummaryRequest) -> Result<SummaryResponse, SummarizeError> {
        let input = serde_json::to_string(req).map_err(|e| self.failed(e.to_string()))?;
        let body = ChatReq {
            model: &self.model,
            messages: vec![
                ChatMsg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMsg {
                    role: "user",
                    content: &input,
                },
            ],
            temperature: 0.2,
            response_format: serde_json::json!({ "type": "json_object" }),
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.failed(e.to_string()))?;

        let status = resp.status();
        match status.as_u16() {
            401 | 403 => {
                return Err(SummarizeError::AuthFailed {
                    provider: self.provider.clone(),
                })
            }
            429 => {
                return Err(SummarizeError::RateLimited {
                    provider: self.provider.clone(),
                })
            }
            _ if !status.is_success() => return Err(self.failed(format!("HTTP {status}"))),
            _ => {}
        }

        let invalid = |reason: String| SummarizeError::InvalidResponse {
            provider: self.provider.clone(),
            reason,
        };
        let chat: ChatResp = resp.json().await.map_err(|e| invalid(e.to_string()))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| invalid("empty completion".into()))?;
        parse_response(&content).map_err(invalid)
    }

    fn name(&self) -> &str {
        &self.provider
    }
}

/// Always fails with `Disabled`; the builder then emits the digest.
pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    async fn summarize(&self, _req: &SummaryRequest) -> Result<SummaryResponse, SummarizeError> {
        Err(SummarizeError::Disabled {
            provider: "disabled".into(),
        })
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

/// Deterministic offline summarizer: one `Schedule` item per message.
pub struct MockSummarizer;

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, req: &SummaryRequest) -> Result<SummaryResponse, SummarizeError> {
        let items = req
            .messages
            .iter()
            .map(|m| RankedItem {
                priority: Priority::Schedule,
                headline: m.subject.clone().unwrap_or_else(|| m.body.clone()),
                rationale: "mock".into(),
                action: None,
                message_ids: vec![m.id],
            })
            .collect();
        Ok(SummaryResponse { items })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// * `disabled` (the `--no-summarize` flag) gives [`DisabledSummarizer`].
/// * `SUMMARIZER_TEST_MODE=mock` gives [`MockSummarizer`].
/// * A missing or disabled config gives [`DisabledSummarizer`].
/// * Otherwise the OpenAI-compatible client for the configured provider.
pub fn build_summarizer(cfg: &SummarizerConfig, disabled: bool) -> anyhow::Result<Arc<dyn Summarizer>> {
    if disabled {
        return Ok(Arc::new(DisabledSummarizer));
    }
    if std::env::var("SUMMARIZER_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Ok(Arc::new(MockSummarizer));
    }
    match cfg.resolve()? {
        Some(resolved) => {
            tracing::info!(target: "briefing", provider = %resolved.provider, model = %resolved.model, "summarizer ready");
            Ok(Arc::new(OpenAiCompatibleSummarizer::new(resolved)?))
        }
        None => {
            tracing::info!(target: "briefing", "summarizer disabled; briefing will be a digest");
            Ok(Arc::new(DisabledSummarizer))
        }
    }
}

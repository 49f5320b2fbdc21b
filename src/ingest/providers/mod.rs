// src/ingest/providers/mod.rs
pub mod gmail;
pub mod slack;
pub mod telegram;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::config::{BriefingConfig, Credentials};
use crate::error::SourceError;
use crate::ingest::aggregator::SourceFailure;
use crate::ingest::types::{SourceAdapter, SourceKind};

pub use gmail::{GmailAdapter, GmailApi, GmailHttpClient, StaticToken, TokenSource};
pub use slack::{SlackAdapter, SlackApi, SlackHttpClient};
pub use telegram::{TelegramAdapter, TelegramApi, TelegramHttpClient};

pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("chief-of-staff/", env!("CARGO_PKG_VERSION"));

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// `Retry-After` in seconds, when the server sent one.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Construct one adapter per enabled source that has credentials. Enabled sources
/// without credentials come back as `Auth` failures so they show up in the briefing.
pub fn build_adapters(
    cfg: &BriefingConfig,
    creds: &Credentials,
    enabled: &BTreeSet<SourceKind>,
) -> (Vec<Arc<dyn SourceAdapter>>, Vec<SourceFailure>) {
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    let mut missing = Vec::new();
    let no_creds = |label: &str, source| SourceFailure {
        label: label.to_string(),
        source,
        error: SourceError::Auth("no credentials configured".into()),
    };

    if enabled.contains(&SourceKind::Gmail) {
        match &creds.gmail {
            Some(token) => {
                let tokens: Arc<dyn TokenSource> = Arc::new(StaticToken::new(token.clone()));
                let api = Arc::new(GmailHttpClient::new(tokens));
                adapters.push(Arc::new(
                    GmailAdapter::new(api).with_attempts(cfg.fetch_attempts),
                ));
            }
            None => missing.push(no_creds("gmail", SourceKind::Gmail)),
        }
    }

    if enabled.contains(&SourceKind::Slack) {
        if creds.slack.is_empty() {
            missing.push(no_creds("slack", SourceKind::Slack));
        }
        for (workspace, token) in &creds.slack {
            let api = Arc::new(SlackHttpClient::new(token.clone()));
            adapters.push(Arc::new(
                SlackAdapter::new(workspace.clone(), api)
                    .with_limits(cfg.slack_channel_limit, cfg.slack_history_limit)
                    .with_attempts(cfg.fetch_attempts),
            ));
        }
    }

    if enabled.contains(&SourceKind::Telegram) {
        match &creds.telegram {
            Some(token) => {
                let api = Arc::new(TelegramHttpClient::new(token.clone()));
                adapters.push(Arc::new(
                    TelegramAdapter::new(api)
                        .with_dialog_limit(cfg.telegram_dialog_limit)
                        .with_attempts(cfg.fetch_attempts),
                ));
            }
            None => missing.push(no_creds("telegram", SourceKind::Telegram)),
        }
    }

    for f in &missing {
        tracing::warn!(target: "ingest", source = %f.label, "source enabled but no credentials configured");
    }
    (adapters, missing)
}

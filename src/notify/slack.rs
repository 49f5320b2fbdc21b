// src/notify/slack.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{BriefingSink, Delivery};

/// Posts the Markdown briefing to a Slack incoming webhook.
#[derive(Clone)]
pub struct SlackWebhookSink {
    webhook_url: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl SlackWebhookSink {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            client: Client::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    /// `None` when `SLACK_WEBHOOK_URL` is unset.
    pub fn from_env() -> Option<Self> {
        std::env::var("SLACK_WEBHOOK_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .map(Self::new)
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }
}

#[async_trait]
impl BriefingSink for SlackWebhookSink {
    fn name(&self) -> &'static str {
        "slack_webhook"
    }

    async fn deliver(&self, d: &Delivery<'_>) -> Result<()> {
        let body = serde_json::json!({ "text": d.markdown });

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook_url)
                .timeout(self.timeout)
                .json(&body)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("Slack webhook HTTP error: {}", e.without_url()),
                },
                Err(e) => anyhow!("Slack webhook request failed: {}", e.without_url()),
            };
            if attempt >= self.max_retries {
                return Err(err);
            }
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }
}

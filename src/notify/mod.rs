// src/notify/mod.rs
//! Delivery of the rendered briefing. Sinks are best effort: a failing sink is
//! logged and the run continues.

pub mod email;
pub mod file;
pub mod slack;

use anyhow::Result;
use async_trait::async_trait;

use crate::briefing::Briefing;
use crate::ingest::Message;

pub use email::EmailSink;
pub use file::FileSink;
pub use slack::SlackWebhookSink;

/// Everything a sink may publish for one run.
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    pub briefing: &'a Briefing,
    pub markdown: &'a str,
    /// Normalized messages, for the raw dump.
    pub messages: &'a [Message],
}

#[async_trait]
pub trait BriefingSink: Send + Sync {
    fn name(&self) -> &'static str;
    async fn deliver(&self, d: &Delivery<'_>) -> Result<()>;
}

const BANNER: &str = "==================================================";

/// Prints the Markdown between banner lines.
pub struct StdoutSink;

#[async_trait]
impl BriefingSink for StdoutSink {
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn deliver(&self, d: &Delivery<'_>) -> Result<()> {
        println!("\n{BANNER}\n{}\n{BANNER}", d.markdown.trim_end());
        Ok(())
    }
}

/// Run every sink in order; returns the names of those that failed.
pub async fn deliver_all(sinks: &[Box<dyn BriefingSink>], d: &Delivery<'_>) -> Vec<&'static str> {
    let mut failed = Vec::new();
    for sink in sinks {
        match sink.deliver(d).await {
            Ok(()) => tracing::info!(sink = sink.name(), "briefing delivered"),
            Err(e) => {
                tracing::warn!(sink = sink.name(), error = ?e, "delivery failed");
                failed.push(sink.name());
            }
        }
    }
    failed
}

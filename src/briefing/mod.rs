// src/briefing/mod.rs
//! Prioritized briefing: batching, the summarization boundary, reconciliation of
//! its answers, the digest fallback and Markdown rendering.

pub mod batch;
pub mod builder;
pub mod render;
pub mod summarizer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::{Message, SourceFailure, SourceKind};

pub use batch::partition;
pub use builder::{BuildPolicy, PriorityRequestBuilder};
pub use render::render_markdown;
pub use summarizer::{
    build_summarizer, DisabledSummarizer, MockSummarizer, OpenAiCompatibleSummarizer,
    RankedItem, RequestMessage, Summarizer, SummaryRequest, SummaryResponse,
};

/// Eisenhower bucket. Declaration order is rendering order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Urgent and important.
    #[serde(alias = "do")]
    DoNow,
    /// Important, not urgent.
    Schedule,
    /// Urgent, not important.
    Delegate,
    /// Ambiguous; needs a question back.
    #[serde(alias = "clarification")]
    Clarify,
    /// Digest entry, never ranked.
    Unranked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BriefingMode {
    Ranked,
    /// Some batches fell back to the digest.
    Partial,
    /// Nothing was ranked.
    Digest,
}

/// Pointer back to a normalized message, with what the renderer needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub source: SourceKind,
    pub source_ref: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    pub context: String,
}

impl From<&Message> for MessageRef {
    fn from(m: &Message) -> Self {
        Self {
            source: m.source,
            source_ref: m.source_ref.clone(),
            sender: m.sender.clone(),
            timestamp: m.timestamp,
            context: m.context.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BriefingItem {
    pub priority: Priority,
    pub headline: String,
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Ascending in normalized order; never empty.
    pub message_refs: Vec<MessageRef>,
    /// Distinct sources of `message_refs`, sorted.
    pub sources: Vec<SourceKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Briefing {
    pub generated_at: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub mode: BriefingMode,
    pub items: Vec<BriefingItem>,
    pub failures: Vec<SourceFailure>,
}

impl Briefing {
    /// Total message references across items.
    pub fn message_count(&self) -> usize {
        self.items.iter().map(|i| i.message_refs.len()).sum()
    }

    pub fn is_all_clear(&self) -> bool {
        self.items.is_empty()
    }
}

/// Lookback window the briefing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BriefingWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

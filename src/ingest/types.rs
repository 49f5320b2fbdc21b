// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::SourceError;

/// External system a message came from. Ordering follows the lowercase names
/// and is used for deterministic tie-breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Gmail,
    Slack,
    Telegram,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::Gmail, SourceKind::Slack, SourceKind::Telegram];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Gmail => "gmail",
            SourceKind::Slack => "slack",
            SourceKind::Telegram => "telegram",
        }
    }

    /// Human label used in rendered briefings.
    pub fn platform(&self) -> &'static str {
        match self {
            SourceKind::Gmail => "Gmail",
            SourceKind::Slack => "Slack",
            SourceKind::Telegram => "Telegram",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical message. Immutable once built by an adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub source: SourceKind,
    /// Unique within `source`: thread id, channel:ts, chat:message-id.
    pub source_ref: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
    /// Free-form provenance: workspace/channel, chat title, mailbox.
    pub context: String,
}

impl Message {
    /// Rough size used for batching.
    pub fn weight(&self) -> usize {
        self.body.chars().count()
            + self.subject.as_deref().map_or(0, |s| s.chars().count())
            + self.sender.chars().count()
            + self.context.chars().count()
    }
}

/// Outcome of one adapter invocation.
pub type SourceResult = Result<Vec<Message>, SourceError>;

/// One configured source instance (Gmail, one Slack workspace, Telegram).
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Messages newer than `since`, unique by `source_ref`.
    async fn fetch_recent(&self, since: DateTime<Utc>) -> SourceResult;

    fn kind(&self) -> SourceKind;

    /// Stable per-instance name (`gmail`, `slack:<workspace>`, `telegram`).
    fn label(&self) -> String {
        self.kind().as_str().to_string()
    }
}

/// Collapse messages sharing `(source, source_ref)`, keeping the copy observed last.
/// First-seen order of the surviving keys is preserved.
pub fn dedup_by_ref(messages: Vec<Message>) -> Vec<Message> {
    let mut slot: HashMap<(SourceKind, String), usize> = HashMap::with_capacity(messages.len());
    let mut out: Vec<Message> = Vec::with_capacity(messages.len());
    for m in messages {
        let key = (m.source, m.source_ref.clone());
        if let Some(&i) = slot.get(&key) {
            out[i] = m;
        } else {
            slot.insert(key, out.len());
            out.push(m);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn msg(source: SourceKind, r: &str, body: &str) -> Message {
        Message {
            source,
            source_ref: r.to_string(),
            sender: "a".into(),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            subject: None,
            body: body.to_string(),
            context: String::new(),
        }
    }

    #[test]
    fn dedup_keeps_last_copy_in_first_position() {
        let out = dedup_by_ref(vec![
            msg(SourceKind::Slack, "c:1", "old"),
            msg(SourceKind::Slack, "c:2", "other"),
            msg(SourceKind::Slack, "c:1", "new"),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].body, "new");
        assert_eq!(out[1].source_ref, "c:2");
    }

    #[test]
    fn same_ref_in_different_sources_is_not_a_duplicate() {
        let out = dedup_by_ref(vec![
            msg(SourceKind::Slack, "1", "x"),
            msg(SourceKind::Telegram, "1", "y"),
        ]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn source_kind_order_matches_names() {
        let names: Vec<&str> = SourceKind::ALL.iter().map(|k| k.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}

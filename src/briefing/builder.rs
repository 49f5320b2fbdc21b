// src/briefing/builder.rs
use chrono::Utc;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::batch::partition;
use super::summarizer::{RequestMessage, Summarizer, SummaryRequest, SummaryResponse};
use super::{Briefing, BriefingItem, BriefingMode, BriefingWindow, MessageRef, Priority};
use crate::ingest::{Message, SourceFailure};
use crate::retry::with_retries;

pub const UNRANKED_RATIONALE: &str = "Not ranked by the summarizer";
const DIGEST_HEADLINE_CHARS: usize = 140;

#[derive(Debug, Clone, Copy)]
pub struct BuildPolicy {
    pub batch_max_messages: usize,
    pub batch_max_chars: usize,
    pub summarize_attempts: u32,
}

impl Default for BuildPolicy {
    fn default() -> Self {
        Self {
            batch_max_messages: 200,
            batch_max_chars: 60_000,
            summarize_attempts: 2,
        }
    }
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("briefing_batches_total", "Summarizer batches attempted.");
        describe_counter!(
            "briefing_batch_fallbacks_total",
            "Batches that fell back to the chronological digest."
        );
        describe_counter!(
            "briefing_response_fixups_total",
            "Summarizer references dropped or added during reconciliation."
        );
    });
}

/// Item with batch-local message ids, after reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub priority: Priority,
    pub headline: String,
    pub rationale: String,
    pub action: Option<String>,
    pub ids: Vec<usize>,
}

/// Make a response cover each of `len` messages exactly once: out-of-range and
/// already-claimed ids are dropped, empty items discarded, leftovers appended as
/// `Clarify`.
pub fn reconcile(resp: SummaryResponse, len: usize) -> Vec<Reconciled> {
    let mut claimed = vec![false; len];
    let mut fixups = 0u64;
    let mut out = Vec::with_capacity(resp.items.len());

    for item in resp.items {
        let mut ids = Vec::with_capacity(item.message_ids.len());
        for id in item.message_ids {
            if id < len && !claimed[id] {
                claimed[id] = true;
                ids.push(id);
            } else {
                fixups += 1;
            }
        }
        if ids.is_empty() {
            continue;
        }
        ids.sort_unstable();
        let priority = match item.priority {
            Priority::Unranked => Priority::Clarify,
            p => p,
        };
        out.push(Reconciled {
            priority,
            headline: item.headline.trim().to_string(),
            rationale: item.rationale.trim().to_string(),
            action: item
                .action
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
            ids,
        });
    }

    for (id, _) in claimed.iter().enumerate().filter(|(_, c)| !**c) {
        fixups += 1;
        out.push(Reconciled {
            priority: Priority::Clarify,
            headline: String::new(),
            rationale: UNRANKED_RATIONALE.to_string(),
            action: None,
            ids: vec![id],
        });
    }

    if fixups > 0 {
        counter!("briefing_response_fixups_total").increment(fixups);
    }
    out
}

fn digest_headline(m: &Message) -> String {
    let text = match m.subject.as_deref() {
        Some(s) if !s.is_empty() => s,
        _ => m.body.as_str(),
    };
    if text.chars().count() <= DIGEST_HEADLINE_CHARS {
        text.to_string()
    } else {
        let cut: String = text.chars().take(DIGEST_HEADLINE_CHARS - 1).collect();
        format!("{}…", cut.trim_end())
    }
}

fn item_from(
    priority: Priority,
    headline: String,
    rationale: String,
    action: Option<String>,
    refs: Vec<&Message>,
) -> BriefingItem {
    let sources: BTreeSet<_> = refs.iter().map(|m| m.source).collect();
    let headline = if headline.is_empty() {
        refs.first().map(|m| digest_headline(m)).unwrap_or_default()
    } else {
        headline
    };
    BriefingItem {
        priority,
        headline,
        rationale,
        action,
        message_refs: refs.into_iter().map(MessageRef::from).collect(),
        sources: sources.into_iter().collect(),
    }
}

/// Builds the request(s) for the summarizer and assembles the final [`Briefing`].
pub struct PriorityRequestBuilder {
    summarizer: Arc<dyn Summarizer>,
    policy: BuildPolicy,
}

impl PriorityRequestBuilder {
    pub fn new(summarizer: Arc<dyn Summarizer>, policy: BuildPolicy) -> Self {
        Self { summarizer, policy }
    }

    /// One request per batch, in order.
    pub fn requests(
        &self,
        messages: &[Message],
        failures: &[SourceFailure],
        window: BriefingWindow,
    ) -> Vec<SummaryRequest> {
        let batches = partition(
            messages,
            self.policy.batch_max_messages,
            self.policy.batch_max_chars,
        );
        let count = batches.len();
        let failed_sources: Vec<String> = failures.iter().map(|f| f.label.clone()).collect();
        batches
            .into_iter()
            .enumerate()
            .map(|(batch_index, range)| SummaryRequest {
                batch_index,
                batch_count: count,
                window_start: window.start,
                window_end: window.end,
                failed_sources: failed_sources.clone(),
                messages: messages[range]
                    .iter()
                    .enumerate()
                    .map(|(id, m)| RequestMessage::from_message(id, m))
                    .collect(),
            })
            .collect()
    }

    /// `messages` must already be normalized (ordered, unique). Never fails: batches
    /// the summarizer cannot rank become digest entries.
    pub async fn build_briefing(
        &self,
        messages: &[Message],
        failures: Vec<SourceFailure>,
        window: BriefingWindow,
    ) -> Briefing {
        ensure_metrics_described();
        let requests = self.requests(messages, &failures, window);

        // (priority, earliest global index, item)
        let mut ranked: Vec<(Priority, usize, BriefingItem)> = Vec::new();
        let mut failed_batches = 0usize;
        let mut offset = 0usize;

        for req in &requests {
            let len = req.messages.len();
            let slice = &messages[offset..offset + len];
            counter!("briefing_batches_total").increment(1);

            let what = format!("summarize batch {}/{}", req.batch_index + 1, req.batch_count);
            let result = with_retries(&what, self.policy.summarize_attempts, || {
                self.summarizer.summarize(req)
            })
            .await;

            match result {
                Ok(resp) => {
                    for r in reconcile(resp, len) {
                        let first = offset + r.ids[0];
                        let refs = r.ids.iter().map(|&i| &slice[i]).collect();
                        ranked.push((
                            r.priority,
                            first,
                            item_from(r.priority, r.headline, r.rationale, r.action, refs),
                        ));
                    }
                }
                Err(e) => {
                    failed_batches += 1;
                    counter!("briefing_batch_fallbacks_total").increment(1);
                    tracing::warn!(
                        target: "briefing",
                        summarizer = self.summarizer.name(),
                        batch = req.batch_index,
                        messages = len,
                        error = %e,
                        "summarization failed; using chronological digest for batch"
                    );
                    for (i, m) in slice.iter().enumerate() {
                        ranked.push((
                            Priority::Unranked,
                            offset + i,
                            item_from(Priority::Unranked, String::new(), String::new(), None, vec![m]),
                        ));
                    }
                }
            }
            offset += len;
        }

        ranked.sort_by_key(|(p, first, _)| (*p, *first));

        let mode = if failed_batches == 0 {
            BriefingMode::Ranked
        } else if failed_batches == requests.len() {
            BriefingMode::Digest
        } else {
            BriefingMode::Partial
        };
        tracing::info!(
            target: "briefing",
            messages = messages.len(),
            batches = requests.len(),
            failed_batches,
            items = ranked.len(),
            ?mode,
            "briefing built"
        );

        Briefing {
            generated_at: Utc::now(),
            window_start: window.start,
            window_end: window.end,
            mode,
            items: ranked.into_iter().map(|(_, _, item)| item).collect(),
            failures,
        }
    }
}

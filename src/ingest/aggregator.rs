//! Aggregator: fans out to every enabled adapter, one tokio task each, and waits
//! for all of them to finish, fail or time out.
//!
//! Nothing here returns an error. A run where every adapter fails still yields an
//! (empty) message list plus the outcome of each adapter.

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::SourceError;
use crate::ingest::ensure_metrics_described;
use crate::ingest::types::{dedup_by_ref, Message, SourceAdapter, SourceKind};

pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub struct AggregatePolicy {
    /// Wall-clock budget per adapter.
    pub timeout: Duration,
}

impl Default for AggregatePolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SOURCE_TIMEOUT,
        }
    }
}

/// A source that produced nothing this run, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub label: String,
    pub source: SourceKind,
    #[serde(serialize_with = "serialize_display")]
    pub error: SourceError,
}

fn serialize_display<S: serde::Serializer>(e: &SourceError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(e)
}

/// Terminal state of one adapter task.
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub label: String,
    pub source: SourceKind,
    pub fetched: usize,
    pub error: Option<SourceError>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// Unordered; unique by `(source, source_ref)`.
    pub messages: Vec<Message>,
    pub outcomes: Vec<SourceOutcome>,
}

impl Aggregation {
    pub fn failures(&self) -> Vec<SourceFailure> {
        self.outcomes
            .iter()
            .filter_map(|o| {
                o.error.as_ref().map(|e| SourceFailure {
                    label: o.label.clone(),
                    source: o.source,
                    error: e.clone(),
                })
            })
            .collect()
    }

    /// label -> failure reason (None when the adapter succeeded).
    pub fn status(&self) -> BTreeMap<String, Option<SourceError>> {
        self.outcomes
            .iter()
            .map(|o| (o.label.clone(), o.error.clone()))
            .collect()
    }

    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| o.error.is_some())
    }
}

/// Run every adapter whose kind is in `enabled` concurrently and merge the successes.
pub async fn aggregate(
    adapters: &[Arc<dyn SourceAdapter>],
    enabled: &BTreeSet<SourceKind>,
    since: DateTime<Utc>,
    policy: AggregatePolicy,
) -> Aggregation {
    ensure_metrics_described();

    let now = Utc::now();
    let since = if since > now {
        tracing::warn!(target: "ingest", %since, "lookback start is in the future; clamping to now");
        now
    } else {
        since
    };

    let mut tasks = Vec::new();
    for adapter in adapters.iter().filter(|a| enabled.contains(&a.kind())) {
        let adapter = Arc::clone(adapter);
        let label = adapter.label();
        let kind = adapter.kind();
        let timeout = policy.timeout;
        let handle = tokio::spawn(async move {
            let t0 = Instant::now();
            let res = tokio::time::timeout(timeout, adapter.fetch_recent(since)).await;
            let res = match res {
                Ok(r) => r,
                Err(_) => Err(SourceError::Transient(format!(
                    "timed out after {}s",
                    timeout.as_secs()
                ))),
            };
            (res, t0.elapsed())
        });
        tasks.push((label, kind, handle));
    }

    let mut out = Aggregation::default();
    for (label, source, handle) in tasks {
        let (res, elapsed) = match handle.await {
            Ok(v) => v,
            Err(e) => (
                Err(SourceError::Transient(format!("adapter task failed: {e}"))),
                Duration::ZERO,
            ),
        };
        histogram!("briefing_source_fetch_ms", "source" => label.clone())
            .record(elapsed.as_secs_f64() * 1_000.0);

        let outcome = match res {
            Ok(mut msgs) => {
                tracing::info!(
                    target: "ingest",
                    source = %label,
                    messages = msgs.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "source fetched"
                );
                counter!("briefing_source_messages_total", "source" => label.clone())
                    .increment(msgs.len() as u64);
                let fetched = msgs.len();
                out.messages.append(&mut msgs);
                SourceOutcome {
                    label,
                    source,
                    fetched,
                    error: None,
                    elapsed,
                }
            }
            Err(e) => {
                tracing::warn!(
                    target: "ingest",
                    source = %label,
                    error = %e,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "source skipped"
                );
                counter!(
                    "briefing_source_failures_total",
                    "source" => label.clone(),
                    "kind" => e.kind()
                )
                .increment(1);
                SourceOutcome {
                    label,
                    source,
                    fetched: 0,
                    error: Some(e),
                    elapsed,
                }
            }
        };
        out.outcomes.push(outcome);
    }

    out.messages = dedup_by_ref(std::mem::take(&mut out.messages));
    out
}

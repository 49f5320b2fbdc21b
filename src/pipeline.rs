// src/pipeline.rs
//! One aggregation run: aggregate, normalize, build the briefing, classify the outcome.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::briefing::{
    Briefing, BriefingMode, BriefingWindow, BuildPolicy, PriorityRequestBuilder, Summarizer,
};
use crate::ingest::{
    aggregate, normalize_with_stats, AggregatePolicy, Message, NormalizePolicy, NormalizeStats,
    SourceAdapter, SourceFailure, SourceKind,
};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub enabled: BTreeSet<SourceKind>,
    pub aggregate: AggregatePolicy,
    pub normalize: NormalizePolicy,
    pub build: BuildPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every source answered and every batch was ranked.
    Complete,
    /// Something was skipped or unranked, but there is a briefing.
    Degraded,
    /// No source was reachable and nothing was collected.
    HardFailure,
}

impl RunOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Complete | RunOutcome::Degraded => 0,
            RunOutcome::HardFailure => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub briefing: Briefing,
    /// Normalized messages the briefing was built from.
    pub messages: Vec<Message>,
    pub stats: NormalizeStats,
    pub outcome: RunOutcome,
}

/// `unavailable` lists enabled sources that could not even be constructed (missing
/// credentials); they are reported next to the adapters that failed at fetch time.
pub async fn run(
    adapters: &[Arc<dyn SourceAdapter>],
    unavailable: Vec<SourceFailure>,
    summarizer: Arc<dyn Summarizer>,
    opts: &RunOptions,
) -> RunReport {
    let agg = aggregate(adapters, &opts.enabled, opts.since, opts.aggregate).await;
    let succeeded = agg.outcomes.iter().filter(|o| o.error.is_none()).count();

    let mut failures: Vec<SourceFailure> = unavailable
        .into_iter()
        .filter(|f| opts.enabled.contains(&f.source))
        .collect();
    failures.extend(agg.failures());
    failures.sort_by(|a, b| a.label.cmp(&b.label));

    let (messages, stats) = normalize_with_stats(agg.messages, &opts.normalize);
    tracing::info!(
        target: "ingest",
        input = stats.input,
        kept = stats.kept,
        duplicates = stats.duplicates,
        noise = stats.noise_dropped,
        empty = stats.empty_dropped,
        "normalized"
    );

    let hard_failure = !opts.enabled.is_empty() && succeeded == 0 && messages.is_empty();

    let builder = PriorityRequestBuilder::new(summarizer, opts.build);
    let window = BriefingWindow {
        start: opts.since,
        end: opts.until,
    };
    let briefing = builder.build_briefing(&messages, failures, window).await;

    let outcome = if hard_failure {
        RunOutcome::HardFailure
    } else if briefing.failures.is_empty() && briefing.mode == BriefingMode::Ranked {
        RunOutcome::Complete
    } else {
        RunOutcome::Degraded
    };
    if outcome == RunOutcome::HardFailure {
        tracing::error!(
            failures = briefing.failures.len(),
            "no source could be reached and nothing was collected"
        );
    }

    RunReport {
        briefing,
        messages,
        stats,
        outcome,
    }
}

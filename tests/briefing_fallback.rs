// tests/briefing_fallback.rs
use async_trait::async_trait;
use chief_of_staff::briefing::{
    BriefingWindow, BuildPolicy, MockSummarizer, PriorityRequestBuilder, Summarizer,
    SummaryRequest, SummaryResponse,
};
use chief_of_staff::{BriefingMode, Message, Priority, SourceKind, SummarizeError};
use chrono::{Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn messages(n: usize) -> Vec<Message> {
    let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    (0..n)
        .map(|i| Message {
            source: SourceKind::ALL[i % 3],
            source_ref: format!("m{i:03}"),
            sender: format!("sender {i}"),
            timestamp: base + Duration::minutes(i as i64),
            subject: None,
            body: format!("message number {i}"),
            context: "ctx".into(),
        })
        .collect()
}

fn window() -> BriefingWindow {
    let end = Utc.timestamp_opt(1_700_100_000, 0).unwrap();
    BriefingWindow {
        start: end - Duration::hours(24),
        end,
    }
}

/// Every call fails as an unparseable response.
struct Garbage {
    calls: AtomicU32,
}

#[async_trait]
impl Summarizer for Garbage {
    async fn summarize(&self, _req: &SummaryRequest) -> Result<SummaryResponse, SummarizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SummarizeError::InvalidResponse {
            provider: "garbage".into(),
            reason: "expected value at line 1 column 1".into(),
        })
    }
    fn name(&self) -> &str {
        "garbage"
    }
}

#[tokio::test(start_paused = true)]
async fn summarizer_failure_yields_chronological_digest_of_everything() {
    let input = messages(9);
    let garbage = Arc::new(Garbage {
        calls: AtomicU32::new(0),
    });
    let builder = PriorityRequestBuilder::new(
        garbage.clone(),
        BuildPolicy {
            batch_max_messages: 4,
            batch_max_chars: 100_000,
            summarize_attempts: 2,
        },
    );
    let b = builder.build_briefing(&input, vec![], window()).await;

    assert_eq!(b.mode, BriefingMode::Digest);
    // 3 batches, 2 attempts each.
    assert_eq!(garbage.calls.load(Ordering::SeqCst), 6);
    assert!(b.items.iter().all(|i| i.priority == Priority::Unranked));
    let refs: Vec<_> = b
        .items
        .iter()
        .flat_map(|i| i.message_refs.iter().map(|r| r.source_ref.clone()))
        .collect();
    let expected: Vec<_> = input.iter().map(|m| m.source_ref.clone()).collect();
    assert_eq!(refs, expected);
}

#[tokio::test]
async fn split_batches_merge_back_in_original_order() {
    let input = messages(25);
    let builder = PriorityRequestBuilder::new(
        Arc::new(MockSummarizer),
        BuildPolicy {
            batch_max_messages: 7,
            batch_max_chars: 100_000,
            summarize_attempts: 1,
        },
    );
    assert_eq!(builder.requests(&input, &[], window()).len(), 4);

    let b = builder.build_briefing(&input, vec![], window()).await;
    assert_eq!(b.mode, BriefingMode::Ranked);
    let refs: Vec<_> = b
        .items
        .iter()
        .flat_map(|i| i.message_refs.iter().map(|r| r.source_ref.clone()))
        .collect();
    let expected: Vec<_> = input.iter().map(|m| m.source_ref.clone()).collect();
    assert_eq!(refs, expected, "every message exactly once, in timestamp order");
}

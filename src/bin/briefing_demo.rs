//! Demo that runs the whole pipeline offline: canned adapters, the mock summarizer,
//! one simulated source timeout. Prints the rendered briefing.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use chief_of_staff::briefing::{render_markdown, BuildPolicy, MockSummarizer};
use chief_of_staff::ingest::{AggregatePolicy, NormalizePolicy, SourceResult};
use chief_of_staff::pipeline::{run, RunOptions};
use chief_of_staff::{Message, SourceAdapter, SourceKind};

struct Canned {
    kind: SourceKind,
    label: &'static str,
    messages: Vec<(&'static str, &'static str, i64)>,
    stall: bool,
}

#[async_trait]
impl SourceAdapter for Canned {
    async fn fetch_recent(&self, _since: DateTime<Utc>) -> SourceResult {
        if self.stall {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        }
        Ok(self
            .messages
            .iter()
            .enumerate()
            .map(|(i, (sender, body, mins_ago))| Message {
                source: self.kind,
                source_ref: format!("{}-{i}", self.label),
                sender: sender.to_string(),
                timestamp: Utc::now() - Duration::minutes(*mins_ago),
                subject: None,
                body: body.to_string(),
                context: self.label.to_string(),
            })
            .collect())
    }
    fn kind(&self) -> SourceKind {
        self.kind
    }
    fn label(&self) -> String {
        self.label.to_string()
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(Canned {
            kind: SourceKind::Gmail,
            label: "gmail",
            messages: vec![("Dana <dana@example.test>", "Contract needs signature by Friday", 90)],
            stall: false,
        }),
        Arc::new(Canned {
            kind: SourceKind::Slack,
            label: "slack:demo",
            messages: vec![("Ana", "Prod deploy is blocked on review", 30), ("Bo", "lunch?", 10)],
            stall: false,
        }),
        Arc::new(Canned {
            kind: SourceKind::Telegram,
            label: "telegram",
            messages: vec![],
            stall: true,
        }),
    ];

    let until = Utc::now();
    let opts = RunOptions {
        since: until - Duration::hours(24),
        until,
        enabled: SourceKind::ALL.into_iter().collect(),
        aggregate: AggregatePolicy {
            timeout: std::time::Duration::from_secs(2),
        },
        normalize: NormalizePolicy::default(),
        build: BuildPolicy::default(),
    };

    let report = run(&adapters, vec![], Arc::new(MockSummarizer), &opts).await;
    println!("{}", render_markdown(&report.briefing));
    println!("briefing-demo done ({:?})", report.outcome);
}

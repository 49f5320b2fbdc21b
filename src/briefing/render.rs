// src/briefing/render.rs
use std::fmt::Write as _;

use super::{Briefing, BriefingItem, BriefingMode, Priority};

const SECTIONS: [(Priority, &str); 4] = [
    (Priority::DoNow, "🔴 Urgent & Important (Do Now)"),
    (Priority::Schedule, "🟡 Not Urgent but Important (Schedule)"),
    (Priority::Delegate, "🔵 Urgent but Not Important (Delegate)"),
    (Priority::Clarify, "🟢 Clarifications"),
];

fn platforms(item: &BriefingItem) -> String {
    item.sources
        .iter()
        .map(|s| s.platform())
        .collect::<Vec<_>>()
        .join(", ")
}

fn senders(item: &BriefingItem) -> String {
    let mut out: Vec<&str> = Vec::new();
    for r in &item.message_refs {
        if !out.contains(&r.sender.as_str()) {
            out.push(&r.sender);
        }
    }
    out.join(", ")
}

fn write_item(out: &mut String, item: &BriefingItem) {
    let _ = writeln!(
        out,
        "- **[{}] {}:** {}",
        platforms(item),
        senders(item),
        item.headline
    );
    let mut contexts: Vec<&str> = item
        .message_refs
        .iter()
        .map(|r| r.context.as_str())
        .filter(|c| !c.is_empty())
        .collect();
    contexts.dedup();
    if !contexts.is_empty() {
        let _ = writeln!(out, "  - Context: {}", contexts.join("; "));
    }
    if !item.rationale.is_empty() {
        let _ = writeln!(out, "  - Why: {}", item.rationale);
    }
    if let Some(action) = &item.action {
        let _ = writeln!(out, "  - Action: {action}");
    }
}

/// Render the briefing as Markdown in the daily layout.
pub fn render_markdown(b: &Briefing) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Daily Briefing: {}", b.window_end.format("%Y-%m-%d"));
    let _ = writeln!(
        out,
        "_Window: {} to {} (UTC)_\n",
        b.window_start.format("%Y-%m-%d %H:%M"),
        b.window_end.format("%Y-%m-%d %H:%M")
    );

    match b.mode {
        BriefingMode::Ranked => {}
        BriefingMode::Partial => {
            out.push_str("> Some messages could not be ranked and are listed in the digest.\n\n")
        }
        BriefingMode::Digest => {
            out.push_str("> Ranking unavailable; showing a chronological digest.\n\n")
        }
    }

    if b.items.is_empty() {
        out.push_str("All clear.\n");
    }

    for (priority, title) in SECTIONS {
        let items: Vec<_> = b.items.iter().filter(|i| i.priority == priority).collect();
        if items.is_empty() {
            continue;
        }
        let _ = writeln!(out, "### {title}");
        for item in items {
            write_item(&mut out, item);
        }
        out.push('\n');
    }

    let mut digest: Vec<_> = b
        .items
        .iter()
        .filter(|i| i.priority == Priority::Unranked)
        .collect();
    if !digest.is_empty() {
        digest.sort_by_key(|i| i.message_refs.first().map(|r| (r.timestamp, r.source, r.source_ref.clone())));
        out.push_str("### Digest\n");
        for item in digest {
            if let Some(r) = item.message_refs.first() {
                let _ = write!(out, "{} ", r.timestamp.format("%m-%d %H:%M"));
            }
            write_item(&mut out, item);
        }
        out.push('\n');
    }

    if !b.failures.is_empty() {
        out.push_str("### Skipped sources\n");
        for f in &b.failures {
            let _ = writeln!(out, "- {}: {}", f.label, f.error);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::briefing::MessageRef;
    use crate::error::SourceError;
    use crate::ingest::{SourceFailure, SourceKind};
    use chrono::{TimeZone, Utc};

    fn item(priority: Priority, sender: &str, headline: &str) -> BriefingItem {
        BriefingItem {
            priority,
            headline: headline.into(),
            rationale: String::new(),
            action: None,
            message_refs: vec![MessageRef {
                source: SourceKind::Slack,
                source_ref: format!("c:{sender}"),
                sender: sender.into(),
                timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
                context: "acme #eng".into(),
            }],
            sources: vec![SourceKind::Slack],
        }
    }

    fn briefing(mode: BriefingMode, items: Vec<BriefingItem>, failures: Vec<SourceFailure>) -> Briefing {
        let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        Briefing {
            generated_at: t,
            window_start: t - chrono::Duration::hours(24),
            window_end: t,
            mode,
            items,
            failures,
        }
    }

    #[test]
    fn empty_briefing_is_all_clear() {
        let md = render_markdown(&briefing(BriefingMode::Ranked, vec![], vec![]));
        assert!(md.contains("All clear."));
        assert!(!md.contains("###"));
    }

    #[test]
    fn sections_follow_priority_order() {
        let mut urgent = item(Priority::DoNow, "Ana", "Prod is down");
        urgent.action = Some("Page on-call".into());
        let md = render_markdown(&briefing(
            BriefingMode::Ranked,
            vec![item(Priority::Clarify, "Bo", "Which venue?"), urgent],
            vec![],
        ));
        let do_now = md.find("(Do Now)").unwrap();
        let clarify = md.find("Clarifications").unwrap();
        assert!(do_now < clarify);
        assert!(md.contains("- **[Slack] Ana:** Prod is down"));
        assert!(md.contains("  - Action: Page on-call"));
        assert!(md.contains("  - Context: acme #eng"));
        assert!(!md.contains("Schedule)"));
    }

    #[test]
    fn digest_and_skipped_sources_are_listed() {
        let md = render_markdown(&briefing(
            BriefingMode::Digest,
            vec![item(Priority::Unranked, "Ana", "lunch?")],
            vec![SourceFailure {
                label: "slack:acme".into(),
                source: SourceKind::Slack,
                error: SourceError::Auth("token_revoked".into()),
            }],
        ));
        assert!(md.contains("chronological digest"));
        assert!(md.contains("### Digest"));
        assert!(md.contains("**[Slack] Ana:** lunch?"));
        assert!(md.contains("- slack:acme: authentication failed: token_revoked"));
    }
}

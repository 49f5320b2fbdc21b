// src/ingest/mod.rs
pub mod aggregator;
pub mod config;
pub mod normalize;
pub mod providers;
pub mod types;

pub use aggregator::{aggregate, AggregatePolicy, Aggregation, SourceFailure, SourceOutcome};
pub use normalize::{normalize, normalize_with_stats, truncate_body, NormalizePolicy, NormalizeStats};
pub use types::{dedup_by_ref, Message, SourceAdapter, SourceKind, SourceResult};

use metrics::{describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up in the snapshot).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "briefing_source_messages_total",
            "Messages returned by source adapters."
        );
        describe_counter!(
            "briefing_source_failures_total",
            "Adapter invocations that ended in a failure or timeout."
        );
        describe_counter!(
            "briefing_items_dropped_total",
            "Raw items dropped by adapters because they could not be parsed."
        );
        describe_counter!(
            "briefing_noise_filtered_total",
            "Messages dropped by the noise policy."
        );
        describe_counter!(
            "briefing_dedup_total",
            "Messages collapsed because they shared a source reference."
        );
        describe_histogram!(
            "briefing_source_fetch_ms",
            "Adapter fetch time in milliseconds."
        );
    });
}

/// Clean raw source text: decode entities, strip tags, fold typographic quotes,
/// collapse whitespace.
pub fn clean_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| {
        regex::Regex::new(r"(?is)</?[a-z][a-z0-9]*(?:\s[^>]*)?/?>").expect("tag regex")
    });
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (incl. nbsp)
    collapse_whitespace(&out)
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

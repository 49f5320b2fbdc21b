//! Normalizer / deduplicator: one pass that turns the aggregated, unordered
//! message set into the canonical ordered sequence.
//!
//! Steps, in order: whitespace cleanup, body truncation, dedup by
//! `(source, source_ref)`, noise filter, sort by `(timestamp, source, source_ref)`.
//! Every step is idempotent and the filter sees the final text, so
//! `normalize(normalize(x)) == normalize(x)`.

use metrics::counter;

use crate::ingest::collapse_whitespace;
use crate::ingest::config::NoisePolicy;
use crate::ingest::types::{dedup_by_ref, Message};

/// Appended to bodies cut at the bound.
pub const TRUNCATION_MARKER: &str = " [...]";

/// Default body bound, in characters.
pub const DEFAULT_BODY_MAX_CHARS: usize = 1500;

#[derive(Debug, Clone)]
pub struct NormalizePolicy {
    pub body_max_chars: usize,
    pub noise: NoisePolicy,
}

impl Default for NormalizePolicy {
    fn default() -> Self {
        Self {
            body_max_chars: DEFAULT_BODY_MAX_CHARS,
            noise: NoisePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub input: usize,
    pub empty_dropped: usize,
    pub duplicates: usize,
    pub noise_dropped: usize,
    pub kept: usize,
}

/// Cut `body` to at most `max_chars` characters, ending in [`TRUNCATION_MARKER`].
/// Bodies already within the bound are returned unchanged, which makes this idempotent.
pub fn truncate_body(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let marker_len = TRUNCATION_MARKER.chars().count();
    if max_chars <= marker_len {
        // No room for the marker. Trailing space would not survive another pass.
        let cut: String = body.chars().take(max_chars).collect();
        return cut.trim_end().to_string();
    }
    let keep: String = body.chars().take(max_chars - marker_len).collect();
    let mut out = keep.trim_end().to_string();
    out.push_str(TRUNCATION_MARKER);
    out
}

pub fn normalize(messages: Vec<Message>, policy: &NormalizePolicy) -> Vec<Message> {
    normalize_with_stats(messages, policy).0
}

pub fn normalize_with_stats(
    messages: Vec<Message>,
    policy: &NormalizePolicy,
) -> (Vec<Message>, NormalizeStats) {
    let mut stats = NormalizeStats {
        input: messages.len(),
        ..Default::default()
    };

    // Clean + truncate
    let cleaned: Vec<Message> = messages
        .into_iter()
        .map(|mut m| {
            m.body = truncate_body(&collapse_whitespace(&m.body), policy.body_max_chars);
            m.sender = m.sender.trim().to_string();
            m.context = m.context.trim().to_string();
            m.subject = m
                .subject
                .map(|s| collapse_whitespace(&s))
                .filter(|s| !s.is_empty());
            m
        })
        .collect();

    // Dedup: last observed copy wins, even when that copy ends up empty
    let before = cleaned.len();
    let unique = dedup_by_ref(cleaned);
    stats.duplicates = before - unique.len();

    // Drop empties, then noise filter on final text
    let mut kept: Vec<Message> = Vec::with_capacity(unique.len());
    for m in unique {
        if m.body.is_empty() && m.subject.is_none() {
            stats.empty_dropped += 1;
            continue;
        }
        if let Some(rule) = policy.noise.matching_rule(&m) {
            tracing::debug!(target: "ingest", source = %m.source, rule, "noise filtered");
            stats.noise_dropped += 1;
            continue;
        }
        kept.push(m);
    }

    kept.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.source.cmp(&b.source))
            .then_with(|| a.source_ref.cmp(&b.source_ref))
    });
    stats.kept = kept.len();

    counter!("briefing_noise_filtered_total").increment(stats.noise_dropped as u64);
    counter!("briefing_dedup_total").increment(stats.duplicates as u64);

    (kept, stats)
}

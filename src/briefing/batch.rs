// src/briefing/batch.rs
use std::ops::Range;

use crate::ingest::Message;

/// Split the ordered sequence into contiguous batches holding at most `max_messages`
/// messages and about `max_chars` characters. A message heavier than `max_chars`
/// gets a batch of its own.
pub fn partition(messages: &[Message], max_messages: usize, max_chars: usize) -> Vec<Range<usize>> {
    let max_messages = max_messages.max(1);
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = 0usize;
    for (i, m) in messages.iter().enumerate() {
        let w = m.weight();
        let len = i - start;
        if len > 0 && (len >= max_messages || chars + w > max_chars) {
            out.push(start..i);
            start = i;
            chars = 0;
        }
        chars += w;
    }
    if start < messages.len() {
        out.push(start..messages.len());
    }
    out
}

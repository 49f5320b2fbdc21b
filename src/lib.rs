// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod briefing;
pub mod cli;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod retry;

// ---- Re-exports for stable public API ----
pub use crate::briefing::{render_markdown, Briefing, BriefingItem, BriefingMode, Priority};
pub use crate::error::{ConfigError, SourceError, SummarizeError};
pub use crate::ingest::{Message, SourceAdapter, SourceKind};
pub use crate::pipeline::{run, RunOptions, RunOutcome, RunReport};

//! Command-line interface definition using clap.

use clap::{Parser, ValueEnum};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::ingest::SourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceArg {
    Gmail,
    Slack,
    Telegram,
    All,
}

/// Chief of Staff - daily briefing from Gmail, Slack and Telegram
#[derive(Parser, Debug)]
#[command(name = "chief-of-staff")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Sources to fetch from
    #[arg(long, value_enum, num_args = 1.., default_values_t = [SourceArg::All])]
    pub sources: Vec<SourceArg>,

    /// Lookback window in hours (overrides the config file)
    #[arg(long)]
    pub lookback_hours: Option<u32>,

    /// Path to briefing.toml
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Where daily_dump_*.json and daily_briefing_*.md are written
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Skip the summarizer and emit the chronological digest
    #[arg(long)]
    pub no_summarize: bool,

    /// Also post the briefing to SLACK_WEBHOOK_URL
    #[arg(long)]
    pub slack_webhook: bool,

    /// Also email the briefing (SMTP_* and NOTIFY_EMAIL_* settings)
    #[arg(long)]
    pub email: bool,

    /// Write a Prometheus metrics snapshot to this path at the end of the run
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,

    /// Enable verbose output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn selected_sources(&self) -> BTreeSet<SourceKind> {
        if self.sources.contains(&SourceArg::All) {
            return SourceKind::ALL.into_iter().collect();
        }
        self.sources
            .iter()
            .filter_map(|s| match s {
                SourceArg::Gmail => Some(SourceKind::Gmail),
                SourceArg::Slack => Some(SourceKind::Slack),
                SourceArg::Telegram => Some(SourceKind::Telegram),
                SourceArg::All => None,
            })
            .collect()
    }

    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub fn log_directive(&self) -> &'static str {
        match self.verbose {
            0 => "chief_of_staff=info,warn",
            1 => "chief_of_staff=debug,info",
            _ => "chief_of_staff=trace,debug",
        }
    }
}

//! Chief of Staff: one-shot daily briefing.
//! Fetches the lookback window from every enabled source, builds the briefing and
//! delivers it to stdout, the output directory and any extra sinks requested.

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chief_of_staff::briefing::{build_summarizer, render_markdown, BuildPolicy};
use chief_of_staff::cli::Cli;
use chief_of_staff::config::ai::SummarizerConfig;
use chief_of_staff::config::{BriefingConfig, Credentials};
use chief_of_staff::error::ConfigError;
use chief_of_staff::ingest::config::load_noise_rules_default;
use chief_of_staff::ingest::providers::build_adapters;
use chief_of_staff::ingest::{AggregatePolicy, NormalizePolicy};
use chief_of_staff::metrics::Metrics;
use chief_of_staff::notify::{
    deliver_all, BriefingSink, Delivery, EmailSink, FileSink, SlackWebhookSink, StdoutSink,
};
use chief_of_staff::pipeline::{self, RunOptions};

const EXIT_CONFIG: u8 = 2;

/// Logs go to stderr so stdout carries only the briefing.
fn init_tracing(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_directive());

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let is_config = e.chain().any(|c| c.downcast_ref::<ConfigError>().is_some());
            tracing::error!(error = ?e, "run aborted");
            eprintln!("error: {e:#}");
            ExitCode::from(if is_config { EXIT_CONFIG } else { 1 })
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let metrics = match &cli.metrics_out {
        Some(_) => Some(Metrics::init()?),
        None => None,
    };

    let mut cfg = BriefingConfig::load(cli.config.as_deref()).context("loading briefing config")?;
    if let Some(h) = cli.lookback_hours {
        if h == 0 {
            return Err(ConfigError::InvalidValue {
                key: "lookback-hours".into(),
                message: "must be greater than zero".into(),
            }
            .into());
        }
        cfg.lookback_hours = h;
    }

    let enabled = cfg.enabled_sources(&cli.selected_sources());
    if enabled.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "sources".into(),
            message: "no source is enabled by both --sources and the config file".into(),
        }
        .into());
    }

    let noise = load_noise_rules_default()
        .map_err(|e| ConfigError::InvalidValue {
            key: "noise_rules".into(),
            message: format!("{e:#}"),
        })?;
    let ai_cfg = SummarizerConfig::load_default().map_err(|e| ConfigError::InvalidValue {
        key: "ai".into(),
        message: format!("{e:#}"),
    })?;
    let summarizer = build_summarizer(&ai_cfg, cli.no_summarize).map_err(|e| {
        ConfigError::InvalidValue {
            key: "ai".into(),
            message: format!("{e:#}"),
        }
    })?;
    let creds = Credentials::from_env().map_err(|e| ConfigError::InvalidValue {
        key: "credentials".into(),
        message: format!("{e:#}"),
    })?;

    let (adapters, unavailable) = build_adapters(&cfg, &creds, &enabled);
    let until = Utc::now();
    let opts = RunOptions {
        since: until - cfg.lookback(),
        until,
        enabled: enabled.clone(),
        aggregate: AggregatePolicy {
            timeout: cfg.source_timeout(),
        },
        normalize: NormalizePolicy {
            body_max_chars: cfg.body_max_chars,
            noise,
        },
        build: BuildPolicy {
            batch_max_messages: cfg.batch_max_messages,
            batch_max_chars: cfg.batch_max_chars,
            summarize_attempts: cfg.summarize_attempts,
        },
    };
    tracing::info!(
        sources = ?enabled,
        adapters = adapters.len(),
        lookback_hours = cfg.lookback_hours,
        "starting briefing run"
    );

    let report = pipeline::run(&adapters, unavailable, summarizer, &opts).await;
    let markdown = render_markdown(&report.briefing);

    let output_dir = cli.output_dir.clone().unwrap_or_else(|| cfg.output_dir());
    let mut sinks: Vec<Box<dyn BriefingSink>> =
        vec![Box::new(StdoutSink), Box::new(FileSink::new(output_dir))];
    if cli.slack_webhook {
        match SlackWebhookSink::from_env() {
            Some(s) => sinks.push(Box::new(s)),
            None => tracing::warn!("--slack-webhook given but SLACK_WEBHOOK_URL is not set"),
        }
    }
    if cli.email {
        match EmailSink::from_env() {
            Ok(s) => sinks.push(Box::new(s)),
            Err(e) => tracing::warn!(error = ?e, "--email given but SMTP settings are incomplete"),
        }
    }
    deliver_all(
        &sinks,
        &Delivery {
            briefing: &report.briefing,
            markdown: &markdown,
            messages: &report.messages,
        },
    )
    .await;

    if let (Some(m), Some(path)) = (&metrics, &cli.metrics_out) {
        if let Err(e) = m.write_snapshot(path) {
            tracing::warn!(error = ?e, "metrics snapshot not written");
        }
    }

    tracing::info!(
        outcome = ?report.outcome,
        mode = ?report.briefing.mode,
        messages = report.messages.len(),
        failures = report.briefing.failures.len(),
        "run finished"
    );
    Ok(report.outcome.exit_code() as u8)
}

//! Error types for the briefing pipeline.

use std::time::Duration;

/// Failure of one source adapter. Never escapes the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Credential invalid or expired. Surfaced to the user, not retried.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The source asked us to back off; skipped for this run.
    #[error("rate limited{}", retry_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// Network error, 5xx or timeout.
    #[error("transient error: {0}")]
    Transient(String),

    /// Malformed payload.
    #[error("parse error: {0}")]
    Parse(String),
}

impl SourceError {
    /// Only transient failures are worth another attempt inside the same run.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }

    /// Short machine-friendly tag, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Auth(_) => "auth",
            SourceError::RateLimited { .. } => "rate_limited",
            SourceError::Transient(_) => "transient",
            SourceError::Parse(_) => "parse",
        }
    }

    /// Classify a reqwest failure that happened before a status was available.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Parse(err.to_string())
        } else {
            SourceError::Transient(err.to_string())
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: reqwest::StatusCode, retry_after: Option<Duration>) -> Self {
        match status.as_u16() {
            401 | 403 => SourceError::Auth(format!("HTTP {status}")),
            429 => SourceError::RateLimited { retry_after },
            _ if status.is_server_error() => SourceError::Transient(format!("HTTP {status}")),
            _ => SourceError::Parse(format!("unexpected HTTP {status}")),
        }
    }
}

fn retry_suffix(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(" (retry after {}s)", d.as_secs()))
        .unwrap_or_default()
}

/// Failure of the summarization collaborator.
#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
    #[error("summarizer {provider} is disabled")]
    Disabled { provider: String },

    #[error("summarizer {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("summarizer {provider} rate limited")]
    RateLimited { provider: String },

    #[error("summarizer {provider} rejected credentials")]
    AuthFailed { provider: String },

    #[error("invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

impl SummarizeError {
    /// Disabled and auth failures will not fix themselves on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SummarizeError::RequestFailed { .. }
                | SummarizeError::RateLimited { .. }
                | SummarizeError::InvalidResponse { .. }
        )
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

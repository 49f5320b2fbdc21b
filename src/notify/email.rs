// src/notify/email.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{BriefingSink, Delivery};
use crate::briefing::BriefingMode;

pub struct EmailSink {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{key} missing"))
}

impl EmailSink {
    pub fn from_env() -> Result<Self> {
        let host = required("SMTP_HOST")?;
        let user = required("SMTP_USER")?;
        let pass = required("SMTP_PASS")?;
        let from_addr = required("NOTIFY_EMAIL_FROM")?;
        let to_addr = required("NOTIFY_EMAIL_TO")?;

        let creds = Credentials::new(user, pass);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .context("invalid SMTP_HOST")?
            .credentials(creds)
            .build();

        let from = from_addr.parse().context("invalid NOTIFY_EMAIL_FROM")?;
        let to = to_addr.parse().context("invalid NOTIFY_EMAIL_TO")?;

        Ok(Self { mailer, from, to })
    }
}

pub fn subject_for(d: &Delivery<'_>) -> String {
    let date = d.briefing.window_end.format("%Y-%m-%d");
    match d.briefing.mode {
        BriefingMode::Ranked => format!("Daily Briefing {date}"),
        BriefingMode::Partial => format!("Daily Briefing {date} (partially ranked)"),
        BriefingMode::Digest => format!("Daily Briefing {date} (digest)"),
    }
}

#[async_trait]
impl BriefingSink for EmailSink {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn deliver(&self, d: &Delivery<'_>) -> Result<()> {
        let msg = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject_for(d))
            .header(header::ContentType::TEXT_PLAIN)
            .body(d.markdown.to_string())
            .context("build email")?;

        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::briefing::Briefing;
    use chrono::{TimeZone, Utc};
    use serial_test::serial;

    #[test]
    fn subject_reflects_mode() {
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let b = Briefing {
            generated_at: t,
            window_start: t,
            window_end: t,
            mode: BriefingMode::Digest,
            items: vec![],
            failures: vec![],
        };
        let d = Delivery {
            briefing: &b,
            markdown: "",
            messages: &[],
        };
        assert_eq!(subject_for(&d), "Daily Briefing 2026-03-01 (digest)");
    }

    #[test]
    #[serial]
    fn missing_smtp_settings_is_an_error() {
        std::env::remove_var("SMTP_HOST");
        let err = EmailSink::from_env().err().unwrap();
        assert!(err.to_string().contains("SMTP_HOST"));
    }
}

// src/notify/file.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use std::path::{Path, PathBuf};

use super::{BriefingSink, Delivery};

/// Writes `daily_dump_<date>.json` and `daily_briefing_<date>.md` into `dir`.
pub struct FileSink {
    dir: PathBuf,
    date: NaiveDate,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            date: Local::now().date_naive(),
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    pub fn dump_path(&self) -> PathBuf {
        self.dir.join(format!("daily_dump_{}.json", self.date.format("%Y-%m-%d")))
    }

    pub fn briefing_path(&self) -> PathBuf {
        self.dir.join(format!("daily_briefing_{}.md", self.date.format("%Y-%m-%d")))
    }
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents)
        .await
        .with_context(|| format!("write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("rename to {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl BriefingSink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn deliver(&self, d: &Delivery<'_>) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create {}", self.dir.display()))?;

        let dump = serde_json::to_vec_pretty(d.messages).context("serialize messages")?;
        write_atomic(&self.dump_path(), &dump).await?;
        write_atomic(&self.briefing_path(), d.markdown.as_bytes()).await?;
        tracing::info!(
            dump = %self.dump_path().display(),
            briefing = %self.briefing_path().display(),
            "briefing saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::briefing::{Briefing, BriefingMode};
    use crate::ingest::{Message, SourceKind};
    use chrono::Utc;

    #[tokio::test]
    async fn writes_dump_and_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested");
        let sink = FileSink::new(&out).with_date(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        let b = Briefing {
            generated_at: Utc::now(),
            window_start: Utc::now(),
            window_end: Utc::now(),
            mode: BriefingMode::Ranked,
            items: vec![],
            failures: vec![],
        };
        let msgs = vec![Message {
            source: SourceKind::Telegram,
            source_ref: "1:2".into(),
            sender: "Ana".into(),
            timestamp: Utc::now(),
            subject: None,
            body: "hello".into(),
            context: "Ops".into(),
        }];
        sink.deliver(&Delivery {
            briefing: &b,
            markdown: "# Daily Briefing\nAll clear.\n",
            messages: &msgs,
        })
        .await
        .unwrap();

        let md = std::fs::read_to_string(out.join("daily_briefing_2026-03-01.md")).unwrap();
        assert!(md.contains("All clear."));
        let dump: Vec<Message> =
            serde_json::from_str(&std::fs::read_to_string(out.join("daily_dump_2026-03-01.json")).unwrap())
                .unwrap();
        assert_eq!(dump, msgs);
    }
}

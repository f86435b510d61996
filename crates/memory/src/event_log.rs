//! Append-only JSONL event log for memory writes, replayed at startup.
//!
//! Append with fsync, atomic overwrite via temp-file + rename, corrupt-line
//! quarantine on load.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use milton_core::MemoryRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEvent {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub record: MemoryRecord,
}

#[derive(Debug, Clone)]
pub struct MemoryEventLog {
    path: PathBuf,
}

impl MemoryEventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, event: &MemoryEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let line = serde_json::to_string(event)?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Atomically replace the event log — write to a `.tmp` sibling, fsync,
    /// then rename over the original so a crash never leaves a torn file.
    pub async fn overwrite(&self, events: &[MemoryEvent]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = self.path.with_extension("jsonl.tmp");

        let write_result: Result<()> = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .await?;
            for event in events {
                let line = serde_json::to_string(event)?;
                file.write_all(line.as_bytes()).await?;
                file.write_all(b"\n").await?;
            }
            file.flush().await?;
            file.sync_all().await?;
            Ok(())
        }
        .await;

        if let Err(err) = write_result {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err);
        }
        if let Err(err) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        Ok(())
    }

    pub fn load(&self) -> Result<Vec<MemoryEvent>> {
        use std::fs::OpenOptions;
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = OpenOptions::new().read(true).open(&self.path)?;
        let reader = BufReader::new(file);
        let mut events = Vec::new();

        for (line_idx, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<MemoryEvent>(&line) {
                Ok(event) => events.push(event),
                Err(err) => {
                    tracing::warn!(
                        line = line_idx + 1,
                        error = %err,
                        path = %self.path.display(),
                        "corrupt memory event — skipping line"
                    );
                }
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use milton_core::MemoryTier;

    fn sample_record(content: &str) -> MemoryRecord {
        MemoryRecord {
            id: Uuid::new_v4(),
            tier: MemoryTier::Short,
            content: content.to_string(),
            tags: vec![],
            importance: 0.5,
            created_at: Utc::now(),
            ttl_secs: Some(48 * 3600),
        }
    }

    #[tokio::test]
    async fn append_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let log = MemoryEventLog::new(dir.path().join("events.jsonl"));
        let event = MemoryEvent { event_id: Uuid::new_v4(), occurred_at: Utc::now(), record: sample_record("hello") };
        log.append(&event).await.unwrap();

        let loaded = log.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].record.content, "hello");
    }

    #[tokio::test]
    async fn overwrite_replaces_contents_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let log = MemoryEventLog::new(dir.path().join("events.jsonl"));
        let e1 = MemoryEvent { event_id: Uuid::new_v4(), occurred_at: Utc::now(), record: sample_record("a") };
        log.append(&e1).await.unwrap();

        log.overwrite(&[]).await.unwrap();
        assert!(log.load().unwrap().is_empty());
    }

    #[test]
    fn load_missing_file_returns_empty() {
        let log = MemoryEventLog::new("/nonexistent/path/events.jsonl");
        assert!(log.load().unwrap().is_empty());
    }
}

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use milton_core::Reminder;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ReminderEvent {
    Create { reminder: Reminder },
    Deliver { id: Uuid, at: DateTime<Utc> },
    Cancel { id: Uuid },
}

#[derive(Debug, Clone)]
pub struct ReminderEventLog {
    path: PathBuf,
}

impl ReminderEventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, event: &ReminderEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&self.path).await?;
        let line = serde_json::to_string(event)?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    pub fn load(&self) -> Result<Vec<ReminderEvent>> {
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
            match serde_json::from_str::<ReminderEvent>(&line) {
                Ok(event) => events.push(event),
                Err(err) => {
                    tracing::warn!(line = line_idx + 1, error = %err, path = %self.path.display(), "corrupt reminder event — skipping line");
                }
            }
        }
        Ok(events)
    }
}

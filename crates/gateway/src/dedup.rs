//! Persisted external-message deduplication: `<state>/dedup/seen.jsonl`.
//! Guards at-most-once `Submit` handling per externally-supplied message id
//! across process restarts — replayed into memory on `open`, appended to on
//! every first sighting.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct SeenEntry {
    external_id: String,
    request_id: Uuid,
}

pub struct DedupStore {
    path: PathBuf,
    seen: Mutex<HashMap<String, Uuid>>,
}

impl DedupStore {
    /// Open the dedup log, replaying any entries left by a prior run.
    /// Malformed lines are logged and skipped rather than failing the open.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.context("creating dedup directory")?;
        }

        let mut seen = HashMap::new();
        if let Ok(contents) = tokio::fs::read_to_string(&path).await {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<SeenEntry>(line) {
                    Ok(entry) => {
                        seen.insert(entry.external_id, entry.request_id);
                    }
                    Err(err) => tracing::warn!(error = %err, "skipping malformed dedup log entry"),
                }
            }
        }

        Ok(Self { path, seen: Mutex::new(seen) })
    }

    /// If `external_id` has already been seen, returns the request id it was
    /// first recorded against. Otherwise records `request_id` and returns
    /// `None` — the caller should proceed with a fresh submission.
    pub async fn check_and_record(&self, external_id: &str, request_id: Uuid) -> Result<Option<Uuid>> {
        let mut seen = self.seen.lock().await;
        if let Some(existing) = seen.get(external_id) {
            return Ok(Some(*existing));
        }

        let entry = SeenEntry { external_id: external_id.to_string(), request_id };
        let line = serde_json::to_string(&entry)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .context("opening dedup log")?;
        file.write_all(line.as_bytes()).await.context("appending dedup entry")?;
        file.write_all(b"\n").await.context("appending dedup entry")?;

        seen.insert(external_id.to_string(), request_id);
        Ok(None)
    }
}

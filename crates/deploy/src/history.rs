use std::path::PathBuf;

use anyhow::{Context, Result};
use milton_core::{DeploymentRecord, DeploymentStatus};

/// `deployment_history/` is one JSON file per record, not a JSONL log — each deployment is its own artifact.
pub struct DeploymentHistory {
    root: PathBuf,
}

impl DeploymentHistory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn append(&self, record: &DeploymentRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.path_for(&record.deployment_id);
        let body = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&path, body).await.with_context(|| format!("writing deployment record {}", path.display()))
    }

    pub fn path_for(&self, deployment_id: &str) -> PathBuf {
        self.root.join(format!("{deployment_id}.json"))
    }

    /// Most recent (by the record's own `timestamp` field, not filename —
    /// a version string embedded before the timestamp in the filename can
    /// otherwise outrank chronological order) `success` record whose target
    /// still has a `.prev` companion on disk.
    pub async fn most_recent_rollback_candidate(&self) -> Result<Option<DeploymentRecord>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                let body = tokio::fs::read(entry.path()).await?;
                records.push(serde_json::from_slice::<DeploymentRecord>(&body)?);
            }
        }
        records.sort_by_key(|r| r.timestamp);
        records.reverse();

        for record in records {
            if record.status != DeploymentStatus::Success || record.reason.is_some() {
                continue;
            }
            if tokio::fs::try_exists(prev_companion(&record.target_path)).await.unwrap_or(false) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

pub fn prev_companion(target_path: &str) -> PathBuf {
    let mut path = PathBuf::from(target_path);
    let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    path.set_file_name(format!("{file_name}.prev"));
    path
}

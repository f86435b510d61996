use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

/// Persists the last-run timestamp per trigger name so a restart after a
/// missed window can catch up exactly once.
pub struct LastRunStore {
    path: PathBuf,
    runs: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl LastRunStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let runs = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self { path, runs: Mutex::new(runs) })
    }

    pub async fn get(&self, trigger_name: &str) -> Option<DateTime<Utc>> {
        self.runs.lock().await.get(trigger_name).copied()
    }

    pub async fn record(&self, trigger_name: &str, at: DateTime<Utc>) -> Result<()> {
        let mut runs = self.runs.lock().await;
        runs.insert(trigger_name.to_string(), at);
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, serde_json::to_vec_pretty(&*runs)?).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_then_reopen_recovers_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last_run.json");

        let store = LastRunStore::open(&path).await.unwrap();
        let now = Utc::now();
        store.record("autobench", now).await.unwrap();

        let reopened = LastRunStore::open(&path).await.unwrap();
        let recovered = reopened.get("autobench").await.unwrap();
        assert_eq!(recovered.timestamp(), now.timestamp());
    }

    #[tokio::test]
    async fn unknown_trigger_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = LastRunStore::open(dir.path().join("last_run.json")).await.unwrap();
        assert!(store.get("never_seen").await.is_none());
    }
}

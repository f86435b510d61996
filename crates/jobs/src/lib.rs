//! Job queue runner: a directory-backed queue processed one job
//! at a time, each run recording a provenance artifact under `outputs/`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub job_id: String,
    pub commit_hash: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: JobStatus,
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub payload: serde_json::Value,
}

/// Implemented once per job "kind"; dispatch between kinds is the caller's
/// responsibility (e.g. by inspecting `job.payload["kind"]`).
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Runs the job, writing any artifacts under `output_dir`, and returns
    /// their paths relative to `output_dir`.
    async fn run(&self, job: &Job, output_dir: &Path) -> Result<Vec<String>>;
}

pub struct JobQueueRunner {
    queue_root: PathBuf,
    outputs_root: PathBuf,
    commit_hash: Option<String>,
}

const PENDING_DIR: &str = "tonight";
const ARCHIVE_DIR: &str = "archive";

impl JobQueueRunner {
    pub fn new(queue_root: impl Into<PathBuf>, outputs_root: impl Into<PathBuf>, commit_hash: Option<String>) -> Self {
        Self { queue_root: queue_root.into(), outputs_root: outputs_root.into(), commit_hash }
    }

    /// Processes every pending job in lexicographic filename order, one at
    /// a time. A job whose handler errors is still archived with a
    /// `Failed` provenance record — the runner advances rather than
    /// getting stuck on one bad job.
    pub async fn run_pending(&self, handler: &dyn JobHandler) -> Result<Vec<ProvenanceRecord>> {
        let pending_dir = self.queue_root.join(PENDING_DIR);
        let archive_dir = self.queue_root.join(ARCHIVE_DIR);
        tokio::fs::create_dir_all(&pending_dir).await?;
        tokio::fs::create_dir_all(&archive_dir).await?;

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&pending_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name());
            }
        }
        names.sort();

        let mut records = Vec::new();
        for name in names {
            let job_path = pending_dir.join(&name);
            let record = self.run_one(&job_path, handler).await?;
            tokio::fs::rename(&job_path, archive_dir.join(&name)).await?;
            records.push(record);
        }
        Ok(records)
    }

    async fn run_one(&self, job_path: &Path, handler: &dyn JobHandler) -> Result<ProvenanceRecord> {
        let job_id = job_path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| "unknown".to_string());
        let payload_bytes = tokio::fs::read(job_path).await.with_context(|| format!("reading job file {}", job_path.display()))?;
        let payload: serde_json::Value = serde_json::from_slice(&payload_bytes).unwrap_or(serde_json::Value::Null);
        let job = Job { id: job_id.clone(), payload };

        let output_dir = self.outputs_root.join(&job_id);
        tokio::fs::create_dir_all(&output_dir).await?;

        let started_at = Utc::now();
        let (status, artifacts, error) = match handler.run(&job, &output_dir).await {
            Ok(artifacts) => (JobStatus::Success, artifacts, None),
            Err(err) => {
                tracing::warn!(job_id = %job_id, error = %err, "job handler failed");
                (JobStatus::Failed, Vec::new(), Some(err.to_string()))
            }
        };
        let finished_at = Utc::now();

        let record = ProvenanceRecord { job_id: job_id.clone(), commit_hash: self.commit_hash.clone(), started_at, finished_at, status, artifacts, error };
        let provenance_path = output_dir.join("provenance.json");
        tokio::fs::write(&provenance_path, serde_json::to_vec_pretty(&record)?).await?;

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;

    #[async_trait]
    impl JobHandler for EchoHandler {
        async fn run(&self, job: &Job, output_dir: &Path) -> Result<Vec<String>> {
            let artifact_path = output_dir.join("result.json");
            tokio::fs::write(&artifact_path, job.payload.to_string()).await?;
            Ok(vec!["result.json".to_string()])
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl JobHandler for FailingHandler {
        async fn run(&self, _job: &Job, _output_dir: &Path) -> Result<Vec<String>> {
            anyhow::bail!("synthetic failure")
        }
    }

    async fn write_job(queue_root: &Path, name: &str, payload: serde_json::Value) {
        let pending = queue_root.join(PENDING_DIR);
        tokio::fs::create_dir_all(&pending).await.unwrap();
        tokio::fs::write(pending.join(name), payload.to_string()).await.unwrap();
    }

    #[tokio::test]
    async fn jobs_process_in_lexicographic_order_and_move_to_archive() {
        let queue_root = tempfile::tempdir().unwrap();
        let outputs_root = tempfile::tempdir().unwrap();
        write_job(queue_root.path(), "002-second.json", serde_json::json!({"n": 2})).await;
        write_job(queue_root.path(), "001-first.json", serde_json::json!({"n": 1})).await;

        let runner = JobQueueRunner::new(queue_root.path(), outputs_root.path(), Some("abc123".to_string()));
        let records = runner.run_pending(&EchoHandler).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].job_id, "001-first");
        assert_eq!(records[1].job_id, "002-second");

        let pending_left = tokio::fs::read_dir(queue_root.path().join(PENDING_DIR)).await.unwrap().next_entry().await.unwrap();
        assert!(pending_left.is_none(), "pending directory should be drained");

        let archived: Vec<_> = {
            let mut entries = tokio::fs::read_dir(queue_root.path().join(ARCHIVE_DIR)).await.unwrap();
            let mut names = Vec::new();
            while let Some(e) = entries.next_entry().await.unwrap() {
                names.push(e.file_name().to_string_lossy().to_string());
            }
            names
        };
        assert_eq!(archived.len(), 2);
    }

    #[tokio::test]
    async fn failing_handler_still_archives_the_job_with_a_failed_record() {
        let queue_root = tempfile::tempdir().unwrap();
        let outputs_root = tempfile::tempdir().unwrap();
        write_job(queue_root.path(), "job.json", serde_json::json!({})).await;

        let runner = JobQueueRunner::new(queue_root.path(), outputs_root.path(), None);
        let records = runner.run_pending(&FailingHandler).await.unwrap();

        assert_eq!(records[0].status, JobStatus::Failed);
        assert!(records[0].error.is_some());
        assert!(queue_root.path().join(ARCHIVE_DIR).join("job.json").exists());
    }

    #[tokio::test]
    async fn provenance_record_is_written_under_outputs_job_id() {
        let queue_root = tempfile::tempdir().unwrap();
        let outputs_root = tempfile::tempdir().unwrap();
        write_job(queue_root.path(), "job-xyz.json", serde_json::json!({"k": "v"})).await;

        let runner = JobQueueRunner::new(queue_root.path(), outputs_root.path(), None);
        runner.run_pending(&EchoHandler).await.unwrap();

        let provenance_path = outputs_root.path().join("job-xyz").join("provenance.json");
        assert!(provenance_path.exists());
        let artifact_path = outputs_root.path().join("job-xyz").join("result.json");
        assert!(artifact_path.exists());
    }

    #[tokio::test]
    async fn a_fresh_run_never_reprocesses_archived_jobs() {
        let queue_root = tempfile::tempdir().unwrap();
        let outputs_root = tempfile::tempdir().unwrap();
        write_job(queue_root.path(), "job.json", serde_json::json!({})).await;

        let runner = JobQueueRunner::new(queue_root.path(), outputs_root.path(), None);
        runner.run_pending(&EchoHandler).await.unwrap();
        let second_run = runner.run_pending(&EchoHandler).await.unwrap();

        assert!(second_run.is_empty());
    }
}

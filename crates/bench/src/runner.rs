use std::path::{Path, PathBuf};

use chrono::Utc;
use milton_core::{BenchmarkCandidate, BenchmarkRun};

use crate::backend::GenerateClient;
use crate::{cove_tier, inference_tier, retrieval_tier};

/// A model build under evaluation: a version tag plus the client used to
/// reach it for the inference and CoVe tiers.
pub struct Candidate<'a> {
    pub model_version: String,
    pub client: &'a (dyn GenerateClient),
}

/// Runs all three benchmark tiers for every candidate and assembles the
/// resulting `BenchmarkRun`. The retrieval tier is corpus-only and does not
/// depend on the candidate, but is still recorded per-candidate so a
/// `BenchmarkCandidate`'s metrics are self-contained.
pub async fn run_all(candidates: &[Candidate<'_>]) -> BenchmarkRun {
    let started_at = Utc::now();
    let mut results = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let mut metrics = inference_tier::run(candidate.client).await;
        metrics.extend(cove_tier::run(candidate.client).await);
        metrics.extend(retrieval_tier::run());

        results.push(BenchmarkCandidate { model_version: candidate.model_version.clone(), metrics });
    }

    let finished_at = Utc::now();
    BenchmarkRun {
        run_id: BenchmarkRun::make_run_id(started_at),
        candidates: results,
        system_info: system_info(),
        started_at,
        finished_at,
    }
}

fn system_info() -> serde_json::Value {
    serde_json::json!({
        "os": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
    })
}

/// Writes the run to `<state_root>/benchmarks/runs/<run_id>.json`, creating
/// the directory if needed.
pub async fn write_run(state_root: impl AsRef<Path>, run: &BenchmarkRun) -> anyhow::Result<PathBuf> {
    let dir = state_root.as_ref().join("benchmarks").join("runs");
    tokio::fs::create_dir_all(&dir).await?;

    let path = dir.join(format!("{}.json", run.run_id));
    let body = serde_json::to_vec_pretty(run)?;
    tokio::fs::write(&path, body).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GenerationStats;
    use async_trait::async_trait;
    use std::time::Duration;

    struct StubClient;

    #[async_trait]
    impl GenerateClient for StubClient {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<GenerationStats> {
            Ok(GenerationStats {
                content: "a plain factual answer".to_string(),
                time_to_first_token: Duration::from_millis(30),
                total_duration: Duration::from_millis(150),
                completion_tokens: 15,
            })
        }
    }

    #[tokio::test]
    async fn run_all_produces_one_candidate_per_input_with_all_three_tiers() {
        let client = StubClient;
        let candidates = vec![Candidate { model_version: "v1.0.0".to_string(), client: &client }];
        let run = run_all(&candidates).await;

        assert_eq!(run.candidates.len(), 1);
        let candidate = &run.candidates[0];
        assert!(candidate.metric("ttft_ms_mean").is_some());
        assert!(candidate.metric("cove_pass_rate").is_some());
        assert!(candidate.metric("retrieval_f1_mean").is_some());
    }

    #[tokio::test]
    async fn write_run_lands_under_benchmarks_runs() {
        let client = StubClient;
        let candidates = vec![Candidate { model_version: "v1.0.0".to_string(), client: &client }];
        let run = run_all(&candidates).await;

        let tmp = tempfile::tempdir().unwrap();
        let path = write_run(tmp.path(), &run).await.unwrap();
        assert!(path.starts_with(tmp.path().join("benchmarks").join("runs")));
        assert!(path.exists());
    }
}

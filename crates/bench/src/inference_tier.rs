//! Inference tier: TTFT and tokens/s over a fixed prompt set,
//! with 3 warmup calls excluded from the recorded statistics.

use std::collections::HashMap;

use milton_core::MetricResult;

use crate::backend::GenerateClient;
use crate::stats::{mean, p95, p99, stddev};

pub const WARMUP_ITERATIONS: usize = 3;

pub const FIXED_PROMPTS: &[&str] = &[
    "What year did the first moon landing happen?",          // factual
    "What is the capital of Japan?",                          // factual
    "If a train leaves at 3pm going 60mph, when does it arrive 180 miles away?", // reasoning
    "A farmer has 17 sheep, all but 9 die. How many are left?", // reasoning
    "Write a function that reverses a string in Python.",    // code
    "Write a Rust function that checks if a number is prime.", // code
    "Summarize the plot of Romeo and Juliet in two sentences.", // factual/reasoning
    "What is the time complexity of binary search?",          // factual
];

pub async fn run(client: &(dyn GenerateClient)) -> HashMap<String, MetricResult> {
    for prompt in FIXED_PROMPTS.iter().take(WARMUP_ITERATIONS) {
        if let Err(err) = client.generate(prompt).await {
            tracing::warn!(error = %err, "inference tier warmup call failed, continuing");
        }
    }

    let mut ttft_samples_ms = Vec::with_capacity(FIXED_PROMPTS.len());
    let mut tokens_per_sec_samples = Vec::with_capacity(FIXED_PROMPTS.len());
    let mut failures = 0usize;

    for prompt in FIXED_PROMPTS {
        match client.generate(prompt).await {
            Ok(stats) => {
                ttft_samples_ms.push(stats.time_to_first_token.as_secs_f64() * 1000.0);
                let seconds = stats.total_duration.as_secs_f64().max(f64::EPSILON);
                tokens_per_sec_samples.push(stats.completion_tokens as f64 / seconds);
            }
            Err(err) => {
                tracing::warn!(error = %err, prompt, "inference tier call failed");
                failures += 1;
            }
        }
    }

    let mut metrics = HashMap::new();
    if ttft_samples_ms.is_empty() {
        metrics.insert("ttft_ms_mean".to_string(), MetricResult::error("ms", "inference endpoint unreachable for all prompts"));
        metrics.insert("tokens_per_sec_mean".to_string(), MetricResult::error("tokens/s", "inference endpoint unreachable for all prompts"));
        return metrics;
    }

    metrics.insert("ttft_ms_mean".to_string(), MetricResult::ok(mean(&ttft_samples_ms), "ms"));
    metrics.insert("ttft_ms_median".to_string(), MetricResult::ok(median(&ttft_samples_ms), "ms"));
    metrics.insert("ttft_ms_stddev".to_string(), MetricResult::ok(stddev(&ttft_samples_ms), "ms"));
    metrics.insert("ttft_ms_p95".to_string(), MetricResult::ok(p95(&ttft_samples_ms), "ms"));
    metrics.insert("ttft_ms_p99".to_string(), MetricResult::ok(p99(&ttft_samples_ms), "ms"));
    metrics.insert("tokens_per_sec_mean".to_string(), MetricResult::ok(mean(&tokens_per_sec_samples), "tokens/s"));

    if failures > 0 {
        metrics.insert(
            "inference_tier_failures".to_string(),
            MetricResult::skipped("count", format!("{failures} of {} prompts failed", FIXED_PROMPTS.len())),
        );
    }

    metrics
}

fn median(samples: &[f64]) -> f64 {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GenerationStats;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GenerateClient for FixedClient {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<GenerationStats> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(GenerationStats {
                content: "answer".to_string(),
                time_to_first_token: Duration::from_millis(50),
                total_duration: Duration::from_millis(200),
                completion_tokens: 20,
            })
        }
    }

    #[tokio::test]
    async fn warmup_calls_are_excluded_from_recorded_stats() {
        let client = FixedClient { calls: AtomicUsize::new(0) };
        let metrics = run(&client).await;

        let total_calls = client.calls.load(Ordering::SeqCst);
        assert_eq!(total_calls, WARMUP_ITERATIONS + FIXED_PROMPTS.len());
        assert_eq!(metrics["ttft_ms_mean"].value, 50.0);
    }

    #[tokio::test]
    async fn all_metrics_carry_ok_status_on_success() {
        let client = FixedClient { calls: AtomicUsize::new(0) };
        let metrics = run(&client).await;
        for key in ["ttft_ms_mean", "ttft_ms_median", "ttft_ms_stddev", "ttft_ms_p95", "ttft_ms_p99", "tokens_per_sec_mean"] {
            assert_eq!(metrics[key].status, milton_core::MetricStatus::Ok);
        }
    }

    struct FailingClient;

    #[async_trait]
    impl GenerateClient for FailingClient {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<GenerationStats> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn endpoint_down_yields_error_status_not_silent_failure() {
        let metrics = run(&FailingClient).await;
        assert_eq!(metrics["ttft_ms_mean"].status, milton_core::MetricStatus::Error);
    }
}

//! Model selector: picks the best benchmark candidate by a
//! threshold gate followed by a weighted, normalized score, with a
//! deterministic tie-break and a recorded rejection trail.

use milton_config::SelectorConfig;
use milton_core::{BenchmarkCandidate, BenchmarkRun, MetricStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejection {
    pub model_version: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub model_version: String,
    pub score: f64,
    pub latency_ms: f64,
    pub tokens_per_sec: f64,
    pub cove_pass_rate: f64,
    pub retrieval_f1: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionResult {
    pub winner: Option<ScoredCandidate>,
    pub ranked: Vec<ScoredCandidate>,
    pub rejected: Vec<Rejection>,
}

const REQUIRED_METRICS: &[&str] = &["ttft_ms_mean", "tokens_per_sec_mean", "cove_pass_rate", "retrieval_f1_mean"];

/// Selects the best candidate in `run` under `config`'s thresholds and
/// weights. Never panics: a run with no eligible candidate yields a
/// `SelectionResult` with `winner: None` and a populated `rejected` trail.
pub fn select(run: &BenchmarkRun, config: &SelectorConfig) -> SelectionResult {
    let mut rejected = Vec::new();
    let mut eligible = Vec::new();

    for candidate in &run.candidates {
        match gate(candidate, config) {
            Ok(scored) => eligible.push(scored),
            Err(reason) => rejected.push(Rejection { model_version: candidate.model_version.clone(), reason }),
        }
    }

    eligible.sort_by(|a, b| tie_break(b, a));

    let winner = eligible.first().cloned();
    SelectionResult { winner, ranked: eligible, rejected }
}

fn gate(candidate: &BenchmarkCandidate, config: &SelectorConfig) -> Result<ScoredCandidate, String> {
    for name in REQUIRED_METRICS {
        match candidate.metric(name) {
            Some(metric) if metric.status == MetricStatus::Ok => {}
            Some(metric) => return Err(format!("metric {name} has status {:?}", metric.status)),
            None => return Err(format!("metric {name} is missing")),
        }
    }

    let cove_pass_rate = candidate.metric("cove_pass_rate").unwrap().value;
    let retrieval_f1 = candidate.metric("retrieval_f1_mean").unwrap().value;
    let latency_ms = candidate.metric("ttft_ms_mean").unwrap().value;
    let tokens_per_sec = candidate.metric("tokens_per_sec_mean").unwrap().value;

    if cove_pass_rate < config.cove_pass_rate_min {
        return Err(format!("cove_pass_rate {cove_pass_rate:.4} below minimum {:.4}", config.cove_pass_rate_min));
    }
    if retrieval_f1 < config.retrieval_f1_min {
        return Err(format!("retrieval_f1 {retrieval_f1:.4} below minimum {:.4}", config.retrieval_f1_min));
    }

    let score = weighted_score(config, latency_ms, tokens_per_sec, cove_pass_rate, retrieval_f1);

    Ok(ScoredCandidate {
        model_version: candidate.model_version.clone(),
        score,
        latency_ms,
        tokens_per_sec,
        cove_pass_rate,
        retrieval_f1,
    })
}

fn weighted_score(config: &SelectorConfig, latency_ms: f64, tokens_per_sec: f64, cove_pass_rate: f64, retrieval_f1: f64) -> f64 {
    let cap = config.latency_cap_ms;
    let latency_norm = 1.0 - (latency_ms.min(cap) / cap);
    let throughput_norm = normalize_unbounded(tokens_per_sec);

    let weights = &config.weights;
    weights.latency as f64 * latency_norm
        + weights.throughput as f64 * throughput_norm
        + weights.cove as f64 * cove_pass_rate
        + weights.retrieval as f64 * retrieval_f1
}

/// Tokens/sec has no natural [0,1] ceiling; squash it with a soft cap so a
/// single outlier candidate can't dominate the weighted sum.
fn normalize_unbounded(value: f64) -> f64 {
    const SOFT_CAP: f64 = 200.0;
    (value.max(0.0) / SOFT_CAP).min(1.0)
}

/// Higher score wins; ties break by lower latency, then higher throughput,
/// then lexicographically smaller version string. `std::cmp::Ordering`
/// returned here is from `a`'s perspective as "better than" `b`.
fn tie_break(a: &ScoredCandidate, b: &ScoredCandidate) -> std::cmp::Ordering {
    a.score
        .partial_cmp(&b.score)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| b.latency_ms.partial_cmp(&a.latency_ms).unwrap_or(std::cmp::Ordering::Equal))
        .then_with(|| a.tokens_per_sec.partial_cmp(&b.tokens_per_sec).unwrap_or(std::cmp::Ordering::Equal))
        .then_with(|| b.model_version.cmp(&a.model_version))
}

//! Small statistics helpers shared across benchmark tiers.

pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

pub fn stddev(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let m = mean(samples);
    let variance = samples.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (samples.len() - 1) as f64;
    variance.sqrt()
}

fn percentile(samples: &[f64], pct: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let rank = (pct * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

pub fn p95(samples: &[f64]) -> f64 {
    percentile(samples, 0.95)
}

pub fn p99(samples: &[f64]) -> f64 {
    percentile(samples, 0.99)
}

//! Retrieval tier: precision/recall/F1 over a fixed golden
//! corpus, scored with deterministic keyword-overlap retrieval. The vector
//! store itself is an external/opaque collaborator, so this tier stands in
//! a local retriever rather than reaching out to one.

use std::collections::{HashMap, HashSet};

use milton_core::MetricResult;

use crate::stats::mean;

struct Document {
    id: &'static str,
    text: &'static str,
}

struct GoldenQuery {
    text: &'static str,
    relevant: &'static [&'static str],
}

const CORPUS: &[Document] = &[
    Document { id: "doc-reminders", text: "Reminders can be created with a due time and delivered through the notification channel." },
    Document { id: "doc-memory-tiers", text: "Memory is organized into short term, working, and long term tiers with different retention windows." },
    Document { id: "doc-model-selection", text: "The model selector compares benchmark candidates using weighted normalized metrics and a threshold gate." },
    Document { id: "doc-deployment", text: "Deployment extracts a bundle, verifies checksums, runs a load test, and performs an atomic install." },
    Document { id: "doc-scheduler", text: "The scheduler runs cron triggers for autobench, morning briefing, job queue kickoff, and reminder ticks." },
    Document { id: "doc-weather", text: "Weather briefings are fetched from an external source and summarized alongside calendar events." },
    Document { id: "doc-finance", text: "Finance briefings pull account balances and recent transactions from a linked provider." },
    Document { id: "doc-rollback", text: "Rollback restores the previous deployment by swapping the current install with its saved backup." },
];

const GOLDEN_QUERIES: &[GoldenQuery] = &[
    GoldenQuery { text: "How are reminders delivered?", relevant: &["doc-reminders"] },
    GoldenQuery { text: "What memory tiers exist?", relevant: &["doc-memory-tiers"] },
    GoldenQuery { text: "How does the system pick the best model?", relevant: &["doc-model-selection"] },
    GoldenQuery { text: "What happens during deployment and rollback?", relevant: &["doc-deployment", "doc-rollback"] },
    GoldenQuery { text: "What automated jobs run on a schedule?", relevant: &["doc-scheduler"] },
];

const TOP_K: usize = 2;

pub fn run() -> HashMap<String, MetricResult> {
    let mut f1_samples = Vec::with_capacity(GOLDEN_QUERIES.len());

    for query in GOLDEN_QUERIES {
        let retrieved = retrieve(query.text, TOP_K);
        let relevant: HashSet<&str> = query.relevant.iter().copied().collect();
        let retrieved_set: HashSet<&str> = retrieved.iter().copied().collect();

        let true_positives = retrieved_set.intersection(&relevant).count() as f64;
        let precision = if retrieved_set.is_empty() { 0.0 } else { true_positives / retrieved_set.len() as f64 };
        let recall = if relevant.is_empty() { 0.0 } else { true_positives / relevant.len() as f64 };
        let f1 = if precision + recall == 0.0 { 0.0 } else { 2.0 * precision * recall / (precision + recall) };
        f1_samples.push(f1);
    }

    let mut metrics = HashMap::new();
    metrics.insert("retrieval_f1_mean".to_string(), MetricResult::ok(mean(&f1_samples), "ratio"));
    metrics
}

/// Ranks corpus documents by Jaccard overlap between query and document
/// word sets, taking the top `k`.
fn retrieve(query: &str, k: usize) -> Vec<&'static str> {
    let query_words: HashSet<String> = tokenize(query);

    let mut scored: Vec<(f64, &'static str)> = CORPUS
        .iter()
        .map(|doc| {
            let doc_words = tokenize(doc.text);
            (overlap_score(&query_words, &doc_words), doc.id)
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap().then_with(|| a.1.cmp(b.1)));
    scored.into_iter().take(k).filter(|(score, _)| *score > 0.0).map(|(_, id)| id).collect()
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase().split_whitespace().map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string()).filter(|w| !w.is_empty()).collect()
}

fn overlap_score(query_words: &HashSet<String>, doc_words: &HashSet<String>) -> f64 {
    if query_words.is_empty() || doc_words.is_empty() {
        return 0.0;
    }
    let intersection = query_words.intersection(doc_words).count() as f64;
    let union = query_words.union(doc_words).count() as f64;
    intersection / union
}

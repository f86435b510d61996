//! Chain-of-Verification tier: generate an answer, derive
//! verification sub-questions, answer them independently, and heuristically
//! flag contradictions against the original answer.

use std::collections::HashMap;

use milton_core::MetricResult;

use crate::backend::GenerateClient;

pub const VERIFICATION_QUESTIONS: &[&str] = &[
    "What is the boiling point of water at sea level in Celsius?",
    "Who wrote the novel Pride and Prejudice?",
    "What is the chemical symbol for gold?",
    "In what year did World War II end?",
];

const NEGATION_WORDS: &[&str] = &["not", "no", "never", "isn't", "wasn't", "doesn't", "didn't", "cannot", "can't"];

pub async fn run(client: &(dyn GenerateClient)) -> HashMap<String, MetricResult> {
    let mut passed = 0usize;
    let mut evaluated = 0usize;
    let mut hard_failures = 0usize;

    for question in VERIFICATION_QUESTIONS {
        match evaluate_question(client, question).await {
            Ok(consistent) => {
                evaluated += 1;
                if consistent {
                    passed += 1;
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, question, "cove tier question failed");
                hard_failures += 1;
            }
        }
    }

    let mut metrics = HashMap::new();
    if evaluated == 0 {
        metrics.insert("cove_pass_rate".to_string(), MetricResult::error("ratio", "no verification question could be evaluated"));
        return metrics;
    }

    let pass_rate = passed as f64 / evaluated as f64;
    metrics.insert("cove_pass_rate".to_string(), MetricResult::ok(pass_rate, "ratio"));
    if hard_failures > 0 {
        metrics.insert(
            "cove_tier_failures".to_string(),
            MetricResult::skipped("count", format!("{hard_failures} of {} questions failed", VERIFICATION_QUESTIONS.len())),
        );
    }
    metrics
}

/// (a) answer, (b) derive a verification sub-question, (c) answer it
/// independently, (d) heuristically compare for contradiction.
async fn evaluate_question(client: &(dyn GenerateClient), question: &str) -> anyhow::Result<bool> {
    let answer = client.generate(question).await?.content;

    let sub_question = format!("Is it true that: \"{}\"? Answer yes or no and briefly explain.", answer.trim());
    let sub_answer = client.generate(&sub_question).await?.content;

    Ok(!contradicts(&answer, &sub_answer))
}

/// Conservative negation/lexical-mismatch heuristic: a sub-answer
/// "contradicts" the original if it leads with negation words the original
/// answer didn't contain, or shares almost no vocabulary with it.
fn contradicts(answer: &str, sub_answer: &str) -> bool {
    let sub_lower = sub_answer.to_lowercase();
    let answer_lower = answer.to_lowercase();

    let sub_negates = NEGATION_WORDS.iter().any(|w| sub_lower.contains(w));
    let answer_negates = NEGATION_WORDS.iter().any(|w| answer_lower.contains(w));
    if sub_negates && !answer_negates {
        return true;
    }

    let overlap = lexical_overlap(&answer_lower, &sub_lower);
    overlap < 0.05 && !sub_answer.trim().is_empty()
}

fn lexical_overlap(a: &str, b: &str) -> f64 {
    use std::collections::HashSet;
    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }
    let intersection = words_a.intersection(&words_b).count() as f64;
    let union = words_a.union(&words_b).count() as f64;
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GenerationStats;
    use async_trait::async_trait;
    use std::time::Duration;

    struct ScriptedClient {
        replies: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GenerateClient for ScriptedClient {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<GenerationStats> {
            let mut replies = self.replies.lock().unwrap();
            let content = if replies.is_empty() { "no reply scripted".to_string() } else { replies.remove(0) };
            Ok(GenerationStats { content, time_to_first_token: Duration::ZERO, total_duration: Duration::ZERO, completion_tokens: 1 })
        }
    }

    #[tokio::test]
    async fn consistent_answers_pass() {
        let client = ScriptedClient {
            replies: std::sync::Mutex::new(vec![
                "Water boils at 100 degrees Celsius at sea level".to_string(),
                "Yes, that is true, water boils at 100 degrees Celsius at sea level".to_string(),
            ]),
        };
        let consistent = evaluate_question(&client, VERIFICATION_QUESTIONS[0]).await.unwrap();
        assert!(consistent);
    }

    #[tokio::test]
    async fn negating_sub_answer_is_flagged_as_contradiction() {
        let client = ScriptedClient {
            replies: std::sync::Mutex::new(vec![
                "Water boils at 100 degrees Celsius".to_string(),
                "No, that is not correct".to_string(),
            ]),
        };
        let consistent = evaluate_question(&client, VERIFICATION_QUESTIONS[0]).await.unwrap();
        assert!(!consistent);
    }

    #[test]
    fn lexical_overlap_of_identical_strings_is_one() {
        assert_eq!(lexical_overlap("the cat sat", "the cat sat"), 1.0);
    }
}

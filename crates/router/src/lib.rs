//! Agent Router: a single LLM call with a fixed system prompt
//! that classifies a request to one of the three agents. Grounded on the
//! teacher's `extract_json_output` parsing idiom — on any parse failure we
//! fall back to the hub agent with zero confidence rather than erroring,
//! since routing must never block a response.

use async_trait::async_trait;
use serde::Deserialize;

use milton_core::Agent;
use milton_llm::{extract_json_output, ChatMessage, InferenceClient};

const SYSTEM_PROMPT: &str = r#"You are a routing classifier for a personal assistant. \
Given the user's message, decide which agent should handle it:
- "hub": conversational replies, general questions, anything not below.
- "executor": requests to take an action (create, update, schedule, run).
- "researcher": requests that need looking something up or synthesizing information.

Reply with a single fenced json block: {"agent": "hub"|"executor"|"researcher", "confidence": 0.0-1.0, "reasoning": "one sentence"}"#;

#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub agent: Agent,
    pub confidence: f32,
    pub reasoning: String,
}

impl RoutingDecision {
    fn fallback(reasoning: impl Into<String>) -> Self {
        Self { agent: Agent::Hub, confidence: 0.0, reasoning: reasoning.into() }
    }
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    agent: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    reasoning: String,
}

/// Abstraction over the inference client so the router can be tested
/// without a running server.
#[async_trait]
pub trait RouteClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String>;
}

#[async_trait]
impl RouteClient for InferenceClient {
    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String> {
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];
        Ok(self.chat(&messages).await?.content)
    }
}

pub struct AgentRouter<C: RouteClient> {
    client: C,
}

impl<C: RouteClient> AgentRouter<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub async fn route(&self, query: &str) -> RoutingDecision {
        let reply = match self.client.complete(SYSTEM_PROMPT, query).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(error = %err, "agent router inference call failed");
                return RoutingDecision::fallback(format!("inference call failed: {err}"));
            }
        };

        match extract_json_output::<RawDecision>(&reply) {
            Some(raw) => match parse_agent(&raw.agent) {
                Some(agent) => RoutingDecision { agent, confidence: raw.confidence.clamp(0.0, 1.0), reasoning: raw.reasoning },
                None => {
                    tracing::warn!(agent = %raw.agent, "router produced unknown agent name");
                    RoutingDecision::fallback(format!("unrecognized agent '{}'", raw.agent))
                }
            },
            None => {
                tracing::warn!(reply = %reply, "router reply was not parseable JSON");
                RoutingDecision::fallback("could not parse routing reply")
            }
        }
    }
}

fn parse_agent(raw: &str) -> Option<Agent> {
    match raw.to_lowercase().as_str() {
        "hub" => Some(Agent::Hub),
        "executor" => Some(Agent::Executor),
        "researcher" => Some(Agent::Researcher),
        _ => None,
    }
}

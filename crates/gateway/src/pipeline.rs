//! Request Gateway: submit/subscribe/deduplicate over a single
//! in-process pipeline. Each request gets its own broadcast channel so any
//! number of WebSocket subscribers can watch the same stream.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use milton_core::{Agent, Intent, IntentKind, Reminder, Request, RequestStatus, StreamEvent};
use milton_intent::normalize;
use milton_llm::{ChatMessage, InferenceClient};
use milton_memory::MemoryManager;
use milton_reminders::ReminderScheduler;
use milton_router::{AgentRouter, RouteClient, RoutingDecision};

use crate::dedup::DedupStore;

const STREAM_CHANNEL_CAPACITY: usize = 256;

struct InFlight {
    request: Request,
    channel: broadcast::Sender<StreamEvent>,
}

/// What `submit` hands back immediately, before the background completion
/// (if any) runs: the request id, which agent took it (`None` for a
/// deterministic no-op or an already-executed action intent), and the
/// router's confidence in that assignment.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub request_id: Uuid,
    pub agent_assigned: Option<Agent>,
    pub confidence: f32,
}

pub struct RequestGateway<C: RouteClient + Send + Sync + 'static> {
    requests: Mutex<HashMap<Uuid, InFlight>>,
    dedup: DedupStore,
    router: Arc<AgentRouter<C>>,
    llm: Arc<InferenceClient>,
    memory: Arc<MemoryManager>,
    reminders: Arc<ReminderScheduler>,
}

impl<C: RouteClient + Send + Sync + 'static> RequestGateway<C> {
    pub async fn new(
        router: Arc<AgentRouter<C>>,
        llm: Arc<InferenceClient>,
        memory: Arc<MemoryManager>,
        reminders: Arc<ReminderScheduler>,
        dedup_log_path: impl Into<PathBuf>,
    ) -> Result<Arc<Self>> {
        let dedup = DedupStore::open(dedup_log_path).await?;
        Ok(Arc::new(Self {
            requests: Mutex::new(HashMap::new()),
            dedup,
            router,
            llm,
            memory,
            reminders,
        }))
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    /// Submit a query. `external_id`, when given, dedups this submission
    /// against prior calls carrying the same id — a repeat returns the
    /// original request's id rather than starting a new pipeline run.
    ///
    /// Intent normalization (and, for action intents, execution) happens
    /// synchronously before this returns. Only an ordinary chat turn's token
    /// streaming and memory write continue in a background task.
    pub async fn submit(
        self: &Arc<Self>,
        query: impl Into<String>,
        agent_override: Option<Agent>,
        external_id: Option<&str>,
    ) -> Result<SubmitOutcome> {
        let query = query.into();

        if let Some(ext_id) = external_id {
            let request = Request::new(query.clone(), None);
            if let Some(existing_id) = self.dedup.check_and_record(ext_id, request.id).await? {
                let agent_assigned = self.get(existing_id).await.and_then(|r| r.agent);
                return Ok(SubmitOutcome { request_id: existing_id, agent_assigned, confidence: 0.0 });
            }
            return self.submit_fresh(request, query, agent_override).await;
        }

        let request = Request::new(query.clone(), None);
        self.submit_fresh(request, query, agent_override).await
    }

    async fn submit_fresh(
        self: &Arc<Self>,
        request: Request,
        query: String,
        agent_override: Option<Agent>,
    ) -> Result<SubmitOutcome> {
        let id = request.id;
        {
            let (tx, _rx) = broadcast::channel(STREAM_CHANNEL_CAPACITY);
            let mut requests = self.requests.lock().await;
            requests.insert(id, InFlight { request, channel: tx });
        }
        self.mutate(id, |r| r.status = RequestStatus::Running).await;

        let intent = normalize(&query, Utc::now());

        if intent.kind == IntentKind::Noop {
            // Deterministic-NOOP invariant: an action-like request that
            // didn't resolve to a concrete rule must never reach the LLM —
            // a hallucinated "done!" would be worse than no response at all.
            let message = intent.fields.task.as_deref().map(deterministic_noop_message);
            self.complete_synchronously(id, message).await;
            return Ok(SubmitOutcome { request_id: id, agent_assigned: None, confidence: intent.confidence });
        }

        if !intent.fields.needs_clarification {
            if let Some(message) = self.execute_action_intent(id, &intent).await {
                self.complete_synchronously(id, Some(message)).await;
                return Ok(SubmitOutcome { request_id: id, agent_assigned: None, confidence: intent.confidence });
            }
        }

        let decision = match agent_override {
            Some(agent) => RoutingDecision { agent, confidence: 1.0, reasoning: "caller-specified agent".to_string() },
            None => self.router.route(&query).await,
        };
        self.mutate(id, |r| r.agent = Some(decision.agent)).await;
        self.emit(
            id,
            StreamEvent::Routing { agent: decision.agent, confidence: decision.confidence, reasoning: decision.reasoning.clone() },
        )
        .await;

        let agent_assigned = decision.agent;
        let confidence = decision.confidence;
        let gateway = Arc::clone(self);
        tokio::spawn(async move { gateway.stream_completion(id, query, decision).await });

        Ok(SubmitOutcome { request_id: id, agent_assigned: Some(agent_assigned), confidence })
    }

    pub async fn subscribe(&self, id: Uuid) -> Option<broadcast::Receiver<StreamEvent>> {
        let requests = self.requests.lock().await;
        requests.get(&id).map(|inflight| inflight.channel.subscribe())
    }

    pub async fn get(&self, id: Uuid) -> Option<Request> {
        let requests = self.requests.lock().await;
        requests.get(&id).map(|inflight| inflight.request.clone())
    }

    pub async fn recent(&self, limit: usize) -> Vec<Request> {
        let requests = self.requests.lock().await;
        let mut all: Vec<Request> = requests.values().map(|i| i.request.clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        all
    }

    async fn emit(&self, id: Uuid, event: StreamEvent) {
        let requests = self.requests.lock().await;
        if let Some(inflight) = requests.get(&id) {
            let _ = inflight.channel.send(event);
        }
    }

    async fn mutate(&self, id: Uuid, f: impl FnOnce(&mut Request)) {
        let mut requests = self.requests.lock().await;
        if let Some(inflight) = requests.get_mut(&id) {
            f(&mut inflight.request);
        }
    }

    /// Mark a request Complete with an optional single confirmation token,
    /// used by both the deterministic-NOOP path and executed action intents.
    async fn complete_synchronously(&self, id: Uuid, message: Option<String>) {
        if let Some(message) = message {
            self.mutate(id, |r| r.response_accum = message.clone()).await;
            self.emit(id, StreamEvent::Token { content: message }).await;
        }
        self.mutate(id, |r| r.status = RequestStatus::Complete).await;
        self.emit(id, StreamEvent::Complete { total_tokens: 0, duration_ms: 0 }).await;
    }

    /// Execute a `ReminderCreate`/`GoalCreate`/`MemoryAdd` intent whose
    /// fields are complete enough to act on without clarification, returning
    /// the confirmation message to emit. `None` means the intent isn't an
    /// action kind and should fall through to routing/chat.
    async fn execute_action_intent(&self, id: Uuid, intent: &Intent) -> Option<String> {
        match intent.kind {
            IntentKind::ReminderCreate => Some(self.create_reminder(id, intent).await),
            IntentKind::GoalCreate => Some(self.create_goal(intent).await),
            IntentKind::MemoryAdd => Some(self.add_remembered_fact(intent).await),
            IntentKind::Chat | IntentKind::Noop => None,
        }
    }

    async fn create_reminder(&self, id: Uuid, intent: &Intent) -> String {
        let task = intent.fields.task.clone().unwrap_or_else(|| "that".to_string());
        let due_epoch = intent.fields.due_epoch.unwrap_or_else(|| Utc::now().timestamp());
        let reminder = Reminder {
            id: Uuid::new_v4(),
            owner: "hub".to_string(),
            task: task.clone(),
            due_epoch,
            created_at: Utc::now().timestamp(),
            delivered_at: None,
            channel: "push".to_string(),
        };
        match self.reminders.create(reminder).await {
            Ok(()) => {
                let due = DateTime::<Utc>::from_timestamp(due_epoch, 0).map(|t| t.to_rfc3339()).unwrap_or_default();
                format!(
                    "Reminder set: I'll remind you to {task} at {due}.\n\
                     ACTION_SUMMARY: {{\"action_executed\": true, \"intent_hint\": \"reminder\"}}"
                )
            }
            Err(err) => {
                tracing::error!(error = %err, request_id = %id, "reminder creation failed");
                format!(
                    "I couldn't set that reminder: {err}.\n\
                     ACTION_SUMMARY: {{\"action_executed\": false, \"intent_hint\": \"reminder\"}}"
                )
            }
        }
    }

    async fn create_goal(&self, intent: &Intent) -> String {
        let task = intent.fields.task.clone().unwrap_or_else(|| "that goal".to_string());
        match self.memory.add_working(format!("Goal: {task}"), vec!["goal".to_string()], 0.7).await {
            Ok(_) => format!(
                "Goal recorded: {task}.\nACTION_SUMMARY: {{\"action_executed\": true, \"intent_hint\": \"goal\"}}"
            ),
            Err(err) => format!(
                "I couldn't save that goal: {err}.\nACTION_SUMMARY: {{\"action_executed\": false, \"intent_hint\": \"goal\"}}"
            ),
        }
    }

    async fn add_remembered_fact(&self, intent: &Intent) -> String {
        let task = intent.fields.task.clone().unwrap_or_else(|| "that".to_string());
        match self.memory.add_long_term("remembered_fact", task.clone(), 0.6, vec!["user_fact".to_string()]).await {
            Ok(_) => format!(
                "Got it, I'll remember that {task}.\nACTION_SUMMARY: {{\"action_executed\": true, \"intent_hint\": \"memory\"}}"
            ),
            Err(err) => format!(
                "I couldn't save that: {err}.\nACTION_SUMMARY: {{\"action_executed\": false, \"intent_hint\": \"memory\"}}"
            ),
        }
    }

    /// Stream the chat completion for a routed (non-action) request, write
    /// the exchange to memory, and mark it Complete. Runs as a background
    /// task spawned by `submit_fresh`.
    async fn stream_completion(self: Arc<Self>, id: Uuid, query: String, decision: RoutingDecision) {
        let started = Instant::now();
        let system_prompt = system_prompt_for(decision.agent);
        let messages = [ChatMessage::system(system_prompt), ChatMessage::user(query.clone())];

        let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(64);
        let llm = Arc::clone(&self.llm);
        let messages_owned = messages.to_vec();
        let chat_task = tokio::spawn(async move { llm.chat_stream(&messages_owned, tx).await });

        while let Some(piece) = rx.recv().await {
            self.mutate(id, |r| r.response_accum.push_str(&piece)).await;
            self.emit(id, StreamEvent::Token { content: piece }).await;
        }

        let completion = match chat_task.await {
            Ok(Ok(completion)) => completion,
            Ok(Err(err)) => {
                tracing::error!(error = %err, request_id = %id, "inference call failed");
                self.mutate(id, |r| { r.status = RequestStatus::Failed; r.error = Some(err.to_string()); }).await;
                return;
            }
            Err(join_err) => {
                tracing::error!(error = %join_err, request_id = %id, "inference task panicked");
                self.mutate(id, |r| { r.status = RequestStatus::Failed; r.error = Some(join_err.to_string()); }).await;
                return;
            }
        };

        let response_text = {
            let requests = self.requests.lock().await;
            requests.get(&id).map(|i| i.request.response_accum.clone()).unwrap_or_default()
        };
        let mem_result = self.memory.add_short_term(decision.agent, response_text, query).await;
        self.emit(
            id,
            StreamEvent::Memory { vector_id: id.to_string(), stored: mem_result.is_ok(), embedding_size: None },
        )
        .await;

        let total_tokens = completion.prompt_tokens + completion.completion_tokens;
        let duration_ms = started.elapsed().as_millis() as u64;
        self.mutate(id, |r| { r.status = RequestStatus::Complete; r.tokens = total_tokens; r.duration_ms = duration_ms; }).await;
        self.emit(id, StreamEvent::Complete { total_tokens, duration_ms }).await;
    }
}

/// Build the structured no-action response plus its machine-readable
/// trailer. `hint` is one of "reminder"/"goal"/
/// "memory", set by the intent normalizer's action-keyword heuristic.
fn deterministic_noop_message(hint: &str) -> String {
    let (noun, examples) = match hint {
        "goal" => ("goal", r#""My goal is to run a marathon" or "goal: finish the report""#),
        "memory" => ("memory", r#""remember that I'm allergic to peanuts""#),
        _ => ("reminder", r#""remind me to call mom in 20 minutes" or "set a reminder for me to submit my report tomorrow at 4:30 PM""#),
    };
    format!(
        "No {noun} was created — I couldn't tell exactly what to do from that phrasing. \
         Try something like: {examples}.\n\
         ACTION_SUMMARY: {{\"action_executed\": false, \"intent_hint\": \"{hint}\"}}"
    )
}

fn system_prompt_for(agent: Agent) -> &'static str {
    match agent {
        Agent::Hub => "You are Milton, a helpful personal assistant. Reply conversationally.",
        Agent::Executor => "You are Milton's executor agent. Carry out the requested action concisely, confirming what you did.",
        Agent::Researcher => "You are Milton's researcher agent. Answer thoroughly, citing reasoning steps where useful.",
    }
}

//! Shared data model. Plain serde structs/enums, no behavior.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Agents ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Agent {
    Hub,
    Executor,
    Researcher,
}

impl std::fmt::Display for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Agent::Hub => "hub",
            Agent::Executor => "executor",
            Agent::Researcher => "researcher",
        };
        f.write_str(s)
    }
}

// ── Request ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub query: String,
    pub agent: Option<Agent>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub response_accum: String,
    pub tokens: u32,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl Request {
    pub fn new(query: impl Into<String>, agent: Option<Agent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            agent,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            response_accum: String::new(),
            tokens: 0,
            duration_ms: 0,
            error: None,
        }
    }
}

// ── StreamEvent ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    Routing {
        agent: Agent,
        confidence: f32,
        reasoning: String,
    },
    Thinking {
        content: String,
    },
    Token {
        content: String,
    },
    Memory {
        vector_id: String,
        stored: bool,
        embedding_size: Option<usize>,
    },
    Complete {
        total_tokens: u32,
        duration_ms: u64,
    },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. })
    }
}

// ── Intent ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    ReminderCreate,
    GoalCreate,
    MemoryAdd,
    Chat,
    Noop,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentFields {
    pub task: Option<String>,
    pub due_epoch: Option<i64>,
    #[serde(default)]
    pub needs_clarification: bool,
    pub clarification_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub kind: IntentKind,
    pub confidence: f32,
    pub surface_form: String,
    pub fields: IntentFields,
}

impl Intent {
    pub fn chat() -> Self {
        Self {
            kind: IntentKind::Chat,
            confidence: 0.0,
            surface_form: "chat".to_string(),
            fields: IntentFields::default(),
        }
    }
}

// ── Reminder ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub owner: String,
    pub task: String,
    pub due_epoch: i64,
    pub created_at: i64,
    pub delivered_at: Option<i64>,
    pub channel: String,
}

// ── MemoryRecord ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTier {
    Short,
    Working,
    Long,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub tier: MemoryTier,
    pub content: String,
    pub tags: Vec<String>,
    pub importance: f32,
    pub created_at: DateTime<Utc>,
    /// Seconds-to-live from `created_at`. Short-term entries get `Some(48*3600)`.
    pub ttl_secs: Option<i64>,
}

impl MemoryRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.ttl_secs {
            Some(ttl) => (now - self.created_at).num_seconds() > ttl,
            None => false,
        }
    }
}

// ── Benchmarking ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricStatus {
    Ok,
    Skipped,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricResult {
    pub value: f64,
    pub unit: String,
    pub status: MetricStatus,
    pub detail: Option<String>,
}

impl MetricResult {
    pub fn ok(value: f64, unit: impl Into<String>) -> Self {
        Self { value, unit: unit.into(), status: MetricStatus::Ok, detail: None }
    }

    pub fn skipped(unit: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { value: 0.0, unit: unit.into(), status: MetricStatus::Skipped, detail: Some(detail.into()) }
    }

    pub fn error(unit: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { value: 0.0, unit: unit.into(), status: MetricStatus::Error, detail: Some(detail.into()) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkCandidate {
    pub model_version: String,
    pub metrics: HashMap<String, MetricResult>,
}

impl BenchmarkCandidate {
    pub fn metric(&self, name: &str) -> Option<&MetricResult> {
        self.metrics.get(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkRun {
    pub run_id: String,
    pub candidates: Vec<BenchmarkCandidate>,
    pub system_info: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BenchmarkRun {
    /// `benchmark_YYYYMMDD_HHMMSS`, lexicographically sortable by construction.
    pub fn make_run_id(at: DateTime<Utc>) -> String {
        format!("benchmark_{}", at.format("%Y%m%d_%H%M%S"))
    }
}

// ── Model Registry ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub version: String,
    pub base_model: String,
    pub distilled_from: Option<String>,
    pub quantization: Option<String>,
    pub model_path: String,
    pub timestamp: DateTime<Utc>,
    pub metrics: HashMap<String, MetricResult>,
    pub active: bool,
    pub last_good: bool,
    pub commit_hash: Option<String>,
}

// ── Bundles ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    pub bundle_id: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub file_count: usize,
    pub total_bytes: u64,
    pub checksum_algo: String,
}

// ── Deployment ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Success,
    Failed,
    DryRun,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub deployment_id: String,
    pub bundle_id: String,
    pub version: String,
    pub target_path: String,
    pub status: DeploymentStatus,
    pub checksum_verified: bool,
    pub load_test_passed: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Set when this record was produced by `Rollback()` rather than `Deploy()`.
    #[serde(default)]
    pub reason: Option<String>,
}

impl DeploymentRecord {
    /// `deploy_<version>_<ts>_<ms>` — millisecond suffix keeps rapid
    /// sequences unique.
    pub fn make_id(version: &str, at: DateTime<Utc>) -> String {
        format!("deploy_{}_{}_{}", version, at.format("%Y%m%d_%H%M%S"), at.timestamp_subsec_millis())
    }
}

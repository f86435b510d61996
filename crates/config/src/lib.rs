use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible `/v1/chat/completions` endpoint.
    pub base_url: String,
    pub model: String,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model: "llama3.1:8b".to_string(),
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub short_term_ttl_hours: i64,
    pub working_promotion_days: i64,
    pub working_promotion_min_importance: f32,
    pub long_term_prune_below_importance: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_ttl_hours: 48,
            working_promotion_days: 7,
            working_promotion_min_importance: 0.5,
            long_term_prune_below_importance: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorWeights {
    pub latency: f32,
    pub throughput: f32,
    pub cove: f32,
    pub retrieval: f32,
}

impl Default for SelectorWeights {
    fn default() -> Self {
        Self { latency: 0.25, throughput: 0.25, cove: 0.25, retrieval: 0.25 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub weights: SelectorWeights,
    pub cove_pass_rate_min: f64,
    pub retrieval_f1_min: f64,
    /// Open Question: latency cap in ms used to bound the
    /// inversion formula `1 - min(latency, cap) / cap`. Pinned at 30s.
    pub latency_cap_ms: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            weights: SelectorWeights::default(),
            cove_pass_rate_min: 0.90,
            retrieval_f1_min: 0.50,
            latency_cap_ms: 30_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub name: String,
    pub cron_expr: String,
    pub jitter_s: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub triggers: Vec<TriggerConfig>,
    pub post_boot_delay_secs: u64,
    pub mem_max_gib: u64,
    pub cpu_quota_percent: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            triggers: vec![
                TriggerConfig { name: "autobench".to_string(), cron_expr: "0 0 */6 * * *".to_string(), jitter_s: 1800 },
                TriggerConfig { name: "morning_briefing".to_string(), cron_expr: "0 0 8 * * *".to_string(), jitter_s: 0 },
                TriggerConfig { name: "job_queue".to_string(), cron_expr: "0 0 22 * * *".to_string(), jitter_s: 0 },
                TriggerConfig { name: "reminder_tick".to_string(), cron_expr: "*/5 * * * * *".to_string(), jitter_s: 0 },
            ],
            post_boot_delay_secs: 300,
            mem_max_gib: 8,
            cpu_quota_percent: 400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind_addr: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { bind_addr: "127.0.0.1:8787".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub state_root: Option<PathBuf>,
    pub llm: LlmConfig,
    pub memory: MemoryConfig,
    pub selector: SelectorConfig,
    pub scheduler: SchedulerConfig,
    pub telemetry: TelemetryConfig,
    pub gateway: GatewayConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }
        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    /// Resolve the state root: explicit config value, else `MILTON_STATE_DIR`,
    /// else `~/.local/state/milton/`.
    pub fn state_root(&self) -> PathBuf {
        if let Some(p) = &self.state_root {
            return p.clone();
        }
        if let Ok(v) = env::var("MILTON_STATE_DIR") {
            if !v.is_empty() {
                return PathBuf::from(v);
            }
        }
        dirs_local_state().join("milton")
    }
}

/// Minimal stand-in for a `dirs`-crate lookup of `$HOME/.local/state` —
/// the only path this crate needs, so it doesn't pull in the extra
/// dependency just for one join.
fn dirs_local_state() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local/state")
}

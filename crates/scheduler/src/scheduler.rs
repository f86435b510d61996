use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use milton_config::SchedulerConfig;
use rand::Rng;
use tokio::task::JoinHandle;

use crate::store::LastRunStore;
use crate::trigger::{next_fire, Trigger, TriggerHandler};

/// Hosts the trigger table and runs one loop task per trigger.
/// Resource ceilings (`mem_max_gib`, `cpu_quota_percent`) are advisory and
/// surfaced to callers rather than enforced by this crate, which has no
/// portable way to cap another task's memory or CPU share.
pub struct Scheduler {
    triggers: Vec<Trigger>,
    post_boot_delay_secs: u64,
    store: Arc<LastRunStore>,
}

impl Scheduler {
    pub async fn new(config: &SchedulerConfig, state_path: impl Into<PathBuf>, handlers: HashMap<String, Arc<dyn TriggerHandler>>) -> anyhow::Result<Self> {
        let store = Arc::new(LastRunStore::open(state_path).await?);
        let mut triggers = Vec::with_capacity(config.triggers.len());
        for trigger_config in &config.triggers {
            let handler = handlers
                .get(&trigger_config.name)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no handler registered for trigger {}", trigger_config.name))?;
            triggers.push(Trigger::new(&trigger_config.name, &trigger_config.cron_expr, trigger_config.jitter_s, handler)?);
        }
        Ok(Self { triggers, post_boot_delay_secs: config.post_boot_delay_secs, store })
    }

    /// Spawns one background task per trigger; returns their join handles
    /// so a caller (e.g. `milton serve`) can await or abort them together.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let store = self.store;
        self.triggers
            .into_iter()
            .map(|trigger| {
                let store = store.clone();
                let post_boot_delay = self.post_boot_delay_secs;
                tokio::spawn(async move { run_trigger_loop(trigger, store, post_boot_delay).await })
            })
            .collect()
    }
}

async fn run_trigger_loop(trigger: Trigger, store: Arc<LastRunStore>, post_boot_delay_secs: u64) {
    if trigger.name == "autobench" && post_boot_delay_secs > 0 {
        tokio::time::sleep(std::time::Duration::from_secs(post_boot_delay_secs)).await;
    }

    loop {
        let now = Utc::now();
        let last_run = store.get(&trigger.name).await;
        let fire_at = next_fire(&trigger.schedule, last_run, now);

        if fire_at > now {
            if let Ok(wait) = (fire_at - now).to_std() {
                tokio::time::sleep(wait).await;
            }
        }

        if trigger.jitter_s > 0 {
            let jitter = rand::thread_rng().gen_range(0..=trigger.jitter_s);
            tokio::time::sleep(std::time::Duration::from_secs(jitter)).await;
        }

        if let Err(err) = trigger.handler.fire().await {
            tracing::warn!(trigger = %trigger.name, error = %err, "trigger handler failed");
        }

        if let Err(err) = store.record(&trigger.name, Utc::now()).await {
            tracing::warn!(trigger = %trigger.name, error = %err, "failed to persist last-run timestamp");
        }
    }
}

//! Memory Store Adapter: short/working/long tiers backed by an
//! in-memory index replayed from an append-only event log.
//!
//! Event-log replay on construction, write-through append, periodic
//! compaction sweep, across Milton's three tiers.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use milton_config::MemoryConfig;
use milton_core::{Agent, MemoryRecord, MemoryTier};

use crate::event_log::{MemoryEvent, MemoryEventLog};
use crate::store::MemoryStore;

#[derive(Debug, Clone, Default)]
pub struct MemoryStats {
    pub short_term: usize,
    pub working: usize,
    pub long_term: usize,
}

pub struct MemoryManager {
    store: Mutex<MemoryStore>,
    log: MemoryEventLog,
    config: MemoryConfig,
}

impl MemoryManager {
    /// Construct a manager over `log_path`, replaying any existing events.
    pub async fn open(log_path: impl Into<std::path::PathBuf>, config: MemoryConfig) -> Result<Arc<Self>> {
        let log = MemoryEventLog::new(log_path);
        let events = log.load()?;
        let mut store = MemoryStore::new();
        for event in events {
            store.insert(event.record);
        }
        Ok(Arc::new(Self { store: Mutex::new(store), log, config }))
    }

    async fn insert_and_log(&self, record: MemoryRecord) -> Result<MemoryRecord> {
        let event = MemoryEvent { event_id: Uuid::new_v4(), occurred_at: Utc::now(), record: record.clone() };
        self.log.append(&event).await?;
        let mut store = self.store.lock().await;
        store.insert(record.clone());
        Ok(record)
    }

    pub async fn add_short_term(&self, agent: Agent, content: impl Into<String>, context: impl Into<String>) -> Result<MemoryRecord> {
        let content = content.into();
        let context = context.into();
        let record = MemoryRecord {
            id: Uuid::new_v4(),
            tier: MemoryTier::Short,
            content: if context.is_empty() { content } else { format!("[{agent}] {content} ({context})") },
            tags: vec![agent.to_string()],
            importance: 0.3,
            created_at: Utc::now(),
            ttl_secs: Some(self.config.short_term_ttl_hours * 3600),
        };
        self.evict_expired_short_term().await;
        self.insert_and_log(record).await
    }

    pub async fn get_recent_short_term(&self, hours: i64, agent: Option<Agent>) -> Vec<MemoryRecord> {
        self.evict_expired_short_term().await;
        let cutoff = Utc::now() - Duration::hours(hours);
        let store = self.store.lock().await;
        store
            .by_tier(MemoryTier::Short)
            .filter(|r| r.created_at >= cutoff)
            .filter(|r| match agent {
                Some(a) => r.tags.iter().any(|t| t == &a.to_string()),
                None => true,
            })
            .cloned()
            .collect()
    }

    pub async fn add_working(&self, content: impl Into<String>, tags: Vec<String>, importance: f32) -> Result<MemoryRecord> {
        let record = MemoryRecord {
            id: Uuid::new_v4(),
            tier: MemoryTier::Working,
            content: content.into(),
            tags,
            importance,
            created_at: Utc::now(),
            ttl_secs: None,
        };
        self.insert_and_log(record).await
    }

    pub async fn add_long_term(&self, category: impl Into<String>, summary: impl Into<String>, importance: f32, tags: Vec<String>) -> Result<MemoryRecord> {
        let category = category.into();
        let mut tags = tags;
        tags.push(category);
        let record = MemoryRecord {
            id: Uuid::new_v4(),
            tier: MemoryTier::Long,
            content: summary.into(),
            tags,
            importance,
            created_at: Utc::now(),
            ttl_secs: None,
        };
        self.insert_and_log(record).await
    }

    /// Case-insensitive substring search across content and tags, newest first.
    pub async fn search(&self, query: &str, tier: Option<MemoryTier>, k: usize) -> Vec<MemoryRecord> {
        let needle = query.to_lowercase();
        let store = self.store.lock().await;
        let mut matches: Vec<MemoryRecord> = store
            .all()
            .iter()
            .filter(|r| tier.is_none_or(|t| r.tier == t))
            .filter(|r| {
                r.content.to_lowercase().contains(&needle)
                    || r.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matches.truncate(k);
        matches
    }

    async fn evict_expired_short_term(&self) {
        let now = Utc::now();
        let mut store = self.store.lock().await;
        store.retain(|r| !(r.tier == MemoryTier::Short && r.is_expired(now)));
    }

    /// Sweep working memory into long-term once it's old enough and
    /// important enough — summarizing each topic cluster of qualifying rows
    /// into a single long-term row rather than promoting them one for one —
    /// and prune long-term entries below the importance floor.
    pub async fn run_compaction(&self) -> Result<MemoryStats> {
        self.evict_expired_short_term().await;

        let promotion_cutoff = Utc::now() - Duration::days(self.config.working_promotion_days);
        let mut to_promote = Vec::new();
        {
            let store = self.store.lock().await;
            for record in store.by_tier(MemoryTier::Working) {
                if record.created_at <= promotion_cutoff
                    && record.importance >= self.config.working_promotion_min_importance
                {
                    to_promote.push(record.clone());
                }
            }
        }

        if !to_promote.is_empty() {
            let clusters = cluster_by_topic(to_promote);
            {
                let mut store = self.store.lock().await;
                for member in clusters.values().flatten() {
                    store.remove(&member.id);
                }
            }
            for (topic, members) in clusters {
                let summary = summarize_cluster(&topic, &members);
                self.insert_and_log(summary).await?;
            }
        }

        let floor = self.config.long_term_prune_below_importance;
        {
            let mut store = self.store.lock().await;
            store.retain(|r| !(r.tier == MemoryTier::Long && r.importance < floor));
        }

        let store = self.store.lock().await;
        Ok(MemoryStats {
            short_term: store.by_tier(MemoryTier::Short).count(),
            working: store.by_tier(MemoryTier::Working).count(),
            long_term: store.by_tier(MemoryTier::Long).count(),
        })
    }

    pub async fn stats(&self) -> MemoryStats {
        let store = self.store.lock().await;
        MemoryStats {
            short_term: store.by_tier(MemoryTier::Short).count(),
            working: store.by_tier(MemoryTier::Working).count(),
            long_term: store.by_tier(MemoryTier::Long).count(),
        }
    }

    pub async fn get(&self, id: &Uuid) -> Option<MemoryRecord> {
        self.store.lock().await.get(id).cloned()
    }
}

/// Group records by topic cluster — their first tag, or `"general"` for
/// untagged rows — preserving insertion order within each cluster.
fn cluster_by_topic(records: Vec<MemoryRecord>) -> BTreeMap<String, Vec<MemoryRecord>> {
    let mut clusters: BTreeMap<String, Vec<MemoryRecord>> = BTreeMap::new();
    for record in records {
        let topic = record.tags.first().cloned().unwrap_or_else(|| "general".to_string());
        clusters.entry(topic).or_default().push(record);
    }
    clusters
}

/// Collapse a topic cluster of working-memory rows into a single long-term
/// row: contents joined in age order, tags the union across members,
/// importance the cluster's max (so a summary never falls below the
/// threshold that promoted its least important member).
fn summarize_cluster(topic: &str, members: &[MemoryRecord]) -> MemoryRecord {
    let mut tags: Vec<String> = vec![topic.to_string()];
    for member in members {
        for tag in &member.tags {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
    }

    let importance = members.iter().map(|m| m.importance).fold(0.0_f32, f32::max);
    let content = if members.len() == 1 {
        members[0].content.clone()
    } else {
        members.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("; ")
    };

    MemoryRecord {
        id: Uuid::new_v4(),
        tier: MemoryTier::Long,
        content,
        tags,
        importance,
        created_at: Utc::now(),
        ttl_secs: None,
    }
}

/// Test-only helper: build a `MemoryRecord` with an explicit timestamp.
#[cfg(test)]
fn dated_record(tier: MemoryTier, importance: f32, created_at: DateTime<Utc>) -> MemoryRecord {
    MemoryRecord { id: Uuid::new_v4(), tier, content: "x".into(), tags: vec![], importance, created_at, ttl_secs: None }
}

/// Test-only helper: build a tagged working-memory record with explicit
/// content, importance, and timestamp.
#[cfg(test)]
fn tagged_working_record(content: &str, tag: &str, importance: f32, created_at: DateTime<Utc>) -> MemoryRecord {
    MemoryRecord {
        id: Uuid::new_v4(),
        tier: MemoryTier::Working,
        content: content.to_string(),
        tags: vec![tag.to_string()],
        importance,
        created_at,
        ttl_secs: None,
    }
}

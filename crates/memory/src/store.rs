//! In-memory index over `MemoryRecord`s: insertion order preserved, O(1)
//! lookup by id, dedup on insert.

use std::collections::HashMap;

use milton_core::{MemoryRecord, MemoryTier};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Vec<MemoryRecord>,
    by_id: HashMap<Uuid, usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any existing record with the same id.
    pub fn insert(&mut self, record: MemoryRecord) {
        if let Some(&idx) = self.by_id.get(&record.id) {
            self.records[idx] = record;
            return;
        }
        self.by_id.insert(record.id, self.records.len());
        self.records.push(record);
    }

    pub fn get(&self, id: &Uuid) -> Option<&MemoryRecord> {
        self.by_id.get(id).map(|&idx| &self.records[idx])
    }

    pub fn all(&self) -> &[MemoryRecord] {
        &self.records
    }

    pub fn by_tier(&self, tier: MemoryTier) -> impl Iterator<Item = &MemoryRecord> {
        self.records.iter().filter(move |r| r.tier == tier)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove every record for which `keep` returns `false`, rebuilding the
    /// id index afterwards. Used for TTL eviction and importance pruning.
    pub fn retain(&mut self, mut keep: impl FnMut(&MemoryRecord) -> bool) {
        self.records.retain(|r| keep(r));
        self.by_id = self
            .records
            .iter()
            .enumerate()
            .map(|(idx, r)| (r.id, idx))
            .collect();
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<MemoryRecord> {
        let idx = self.by_id.remove(id)?;
        let removed = self.records.remove(idx);
        for v in self.by_id.values_mut() {
            if *v > idx {
                *v -= 1;
            }
        }
        Some(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(tier: MemoryTier, content: &str) -> MemoryRecord {
        MemoryRecord {
            id: Uuid::new_v4(),
            tier,
            content: content.to_string(),
            tags: vec![],
            importance: 0.5,
            created_at: Utc::now(),
            ttl_secs: None,
        }
    }

    #[test]
    fn insert_dedups_by_id() {
        let mut store = MemoryStore::new();
        let mut r = record(MemoryTier::Short, "first");
        store.insert(r.clone());
        r.content = "updated".to_string();
        store.insert(r.clone());

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&r.id).unwrap().content, "updated");
    }

    #[test]
    fn retain_rebuilds_index() {
        let mut store = MemoryStore::new();
        let keep = record(MemoryTier::Long, "keep");
        let drop = record(MemoryTier::Short, "drop");
        store.insert(keep.clone());
        store.insert(drop.clone());

        store.retain(|r| r.tier == MemoryTier::Long);

        assert_eq!(store.len(), 1);
        assert!(store.get(&keep.id).is_some());
        assert!(store.get(&drop.id).is_none());
    }

    #[test]
    fn by_tier_filters() {
        let mut store = MemoryStore::new();
        store.insert(record(MemoryTier::Short, "a"));
        store.insert(record(MemoryTier::Working, "b"));
        assert_eq!(store.by_tier(MemoryTier::Short).count(), 1);
    }
}

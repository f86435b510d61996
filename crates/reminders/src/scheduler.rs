use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use milton_core::Reminder;

use crate::event_log::{ReminderEvent, ReminderEventLog};

const TICK_INTERVAL: StdDuration = StdDuration::from_secs(5);

struct Inner {
    heap: BinaryHeap<Reverse<(i64, Uuid)>>,
    reminders: HashMap<Uuid, Reminder>,
}

impl Inner {
    fn new() -> Self {
        Self { heap: BinaryHeap::new(), reminders: HashMap::new() }
    }
}

pub struct ReminderScheduler {
    inner: Mutex<Inner>,
    log: ReminderEventLog,
}

impl ReminderScheduler {
    pub async fn open(log_path: impl Into<std::path::PathBuf>) -> Result<Arc<Self>> {
        let log = ReminderEventLog::new(log_path);
        let events = log.load()?;
        let mut inner = Inner::new();
        for event in events {
            apply(&mut inner, event);
        }
        Ok(Arc::new(Self { inner: Mutex::new(inner), log }))
    }

    pub async fn create(&self, reminder: Reminder) -> Result<()> {
        self.log.append(&ReminderEvent::Create { reminder: reminder.clone() }).await?;
        let mut inner = self.inner.lock().await;
        apply(&mut inner, ReminderEvent::Create { reminder });
        Ok(())
    }

    pub async fn cancel(&self, id: Uuid) -> Result<bool> {
        let existed = {
            let inner = self.inner.lock().await;
            inner.reminders.contains_key(&id)
        };
        if !existed {
            return Ok(false);
        }
        self.log.append(&ReminderEvent::Cancel { id }).await?;
        let mut inner = self.inner.lock().await;
        apply(&mut inner, ReminderEvent::Cancel { id });
        Ok(true)
    }

    /// Pop every reminder due at or before `now`, marking each delivered.
    /// The stale heap entries left behind by cancellation are skipped here
    /// rather than removed eagerly, since `BinaryHeap` has no decrease-key.
    pub async fn tick(&self, now: i64) -> Result<Vec<Reminder>> {
        let mut due = Vec::new();
        let mut inner = self.inner.lock().await;
        while let Some(Reverse((due_epoch, id))) = inner.heap.peek().copied() {
            if due_epoch > now {
                break;
            }
            inner.heap.pop();
            let Some(reminder) = inner.reminders.get(&id).cloned() else { continue };
            if reminder.delivered_at.is_some() {
                continue;
            }
            due.push(reminder);
        }
        drop(inner);

        for reminder in &due {
            self.log.append(&ReminderEvent::Deliver { id: reminder.id, at: Utc::now() }).await?;
            let mut inner = self.inner.lock().await;
            apply(&mut inner, ReminderEvent::Deliver { id: reminder.id, at: Utc::now() });
        }
        Ok(due)
    }

    pub async fn pending_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.reminders.values().filter(|r| r.delivered_at.is_none()).count()
    }

    /// Run the 5-second poll loop, forwarding each delivered reminder to
    /// `tx`. Intended to be spawned as a background task by the scheduler
    /// host (/§4.10).
    pub async fn run(self: Arc<Self>, tx: mpsc::Sender<Reminder>) {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            interval.tick().await;
            match self.tick(Utc::now().timestamp()).await {
                Ok(due) => {
                    for reminder in due {
                        if tx.send(reminder).await.is_err() {
                            return;
                        }
                    }
                }
                Err(err) => tracing::error!(error = %err, "reminder tick failed"),
            }
        }
    }
}

fn apply(inner: &mut Inner, event: ReminderEvent) {
    match event {
        ReminderEvent::Create { reminder } => {
            inner.heap.push(Reverse((reminder.due_epoch, reminder.id)));
            inner.reminders.insert(reminder.id, reminder);
        }
        ReminderEvent::Deliver { id, at } => {
            if let Some(reminder) = inner.reminders.get_mut(&id) {
                reminder.delivered_at = Some(at.timestamp());
            }
        }
        ReminderEvent::Cancel { id } => {
            inner.reminders.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reminder(due_epoch: i64) -> Reminder {
        Reminder { id: Uuid::new_v4(), owner: "hub".into(), task: "call mom".into(), due_epoch, created_at: 0, delivered_at: None, channel: "push".into() }
    }

    #[tokio::test]
    async fn tick_delivers_due_reminders_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let sched = ReminderScheduler::open(dir.path().join("events.jsonl")).await.unwrap();
        sched.create(reminder(100)).await.unwrap();
        sched.create(reminder(50)).await.unwrap();
        sched.create(reminder(200)).await.unwrap();

        let due = sched.tick(150).await.unwrap();
        assert_eq!(due.len(), 2);
        assert!(due[0].due_epoch <= due[1].due_epoch);
        assert_eq!(sched.pending_count().await, 1);
    }

    #[tokio::test]
    async fn cancel_prevents_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let sched = ReminderScheduler::open(dir.path().join("events.jsonl")).await.unwrap();
        let r = reminder(50);
        let id = r.id;
        sched.create(r).await.unwrap();
        assert!(sched.cancel(id).await.unwrap());

        let due = sched.tick(100).await.unwrap();
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn cancel_unknown_id_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let sched = ReminderScheduler::open(dir.path().join("events.jsonl")).await.unwrap();
        assert!(!sched.cancel(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn replay_reconstructs_pending_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let id;
        {
            let sched = ReminderScheduler::open(&path).await.unwrap();
            let r = reminder(500);
            id = r.id;
            sched.create(r).await.unwrap();
        }
        let reopened = ReminderScheduler::open(&path).await.unwrap();
        assert_eq!(reopened.pending_count().await, 1);
        assert!(reopened.inner.lock().await.reminders.contains_key(&id));
    }
}

//! Reminder Scheduler: an append-only JSONL event log of
//! `Create`/`Deliver`/`Cancel` events, replayed into an in-memory min-heap
//! ordered by due time. A 5-second ticker polls for due reminders.
//!
//! Grounded on `milton-memory`'s event log (same append/fsync/rename-on-load
//! shape), here applied to reminder delivery instead of memory writes.

pub mod event_log;
pub mod scheduler;

pub use event_log::{ReminderEvent, ReminderEventLog};
pub use scheduler::ReminderScheduler;

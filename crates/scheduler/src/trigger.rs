use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;

/// Invoked when a trigger fires. Implementors own whatever pipeline the
/// trigger kicks off (autobench, briefing, job queue, reminder tick).
#[async_trait]
pub trait TriggerHandler: Send + Sync {
    async fn fire(&self) -> Result<()>;
}

pub struct Trigger {
    pub name: String,
    pub schedule: Schedule,
    pub jitter_s: u64,
    pub handler: std::sync::Arc<dyn TriggerHandler>,
}

impl Trigger {
    pub fn new(name: impl Into<String>, cron_expr: &str, jitter_s: u64, handler: std::sync::Arc<dyn TriggerHandler>) -> Result<Self> {
        let schedule = Schedule::from_str(cron_expr).with_context(|| format!("parsing cron expression {cron_expr:?}"))?;
        Ok(Self { name: name.into(), schedule, jitter_s, handler })
    }
}

/// Decides when this trigger should next run. If `last_run` is `None`
/// (first boot ever), the normal next occurrence after `now` is used. If
/// the trigger's next occurrence after `last_run` already lies in the
/// past, the boot counts as a missed window and the trigger catches up by
/// firing immediately — exactly once, since the caller records a fresh
/// `last_run` right after firing.
pub fn next_fire(schedule: &Schedule, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match last_run {
        None => schedule.after(&now).next().unwrap_or(now),
        Some(last_run) => {
            let expected = schedule.after(&last_run).next().unwrap_or(now);
            if expected <= now {
                now
            } else {
                expected
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn every_six_hours() -> Schedule {
        Schedule::from_str("0 0 */6 * * *").unwrap()
    }

    #[test]
    fn first_boot_with_no_last_run_waits_for_normal_occurrence() {
        let now = DateTime::parse_from_rfc3339("2026-07-27T10:15:00Z").unwrap().with_timezone(&Utc);
        let next = next_fire(&every_six_hours(), None, now);
        assert!(next > now);
    }

    #[test]
    fn missed_window_triggers_immediate_catch_up() {
        let last_run = DateTime::parse_from_rfc3339("2026-07-27T00:00:00Z").unwrap().with_timezone(&Utc);
        // Next occurrence after last_run would be 06:00, but "now" is already 09:00 — missed.
        let now = DateTime::parse_from_rfc3339("2026-07-27T09:00:00Z").unwrap().with_timezone(&Utc);
        let next = next_fire(&every_six_hours(), Some(last_run), now);
        assert_eq!(next, now);
    }

    #[test]
    fn on_schedule_waits_for_upcoming_occurrence() {
        let last_run = DateTime::parse_from_rfc3339("2026-07-27T00:00:00Z").unwrap().with_timezone(&Utc);
        let now = DateTime::parse_from_rfc3339("2026-07-27T02:00:00Z").unwrap().with_timezone(&Utc);
        let next = next_fire(&every_six_hours(), Some(last_run), now);
        assert_eq!(next.to_rfc3339(), "2026-07-27T06:00:00+00:00");
    }
}

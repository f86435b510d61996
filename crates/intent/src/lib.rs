//! Intent Normalizer: a deterministic, priority-ordered regex
//! rule table mapping raw text to an `Intent`. No LLM call — this runs
//! before routing so that cheap, unambiguous requests never reach the
//! agent router at all.
//!
//! Rule order below is the priority order: explicit-time
//! reminder > relative-time reminder > time-of-day reminder > simple
//! reminder > goal > memory > action-keyword noop hint > chat fallback.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc, Weekday};
use regex::{Captures, Regex};

use milton_core::{Intent, IntentFields, IntentKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleKind {
    Blank,
    ReminderExplicit,
    ReminderRelative,
    ReminderTimeOfDay,
    ReminderSimple,
    Goal,
    Memory,
    NoopHint,
}

struct Rule {
    kind: RuleKind,
    pattern: &'static LazyLock<Regex>,
}

const REMINDER_VERB: &str = r"(?:remind me|set(?:\s+a)?\s+reminder(?:\s+for me)?|create(?:\s+a)?\s+reminder(?:\s+for me)?|add(?:\s+a)?\s+reminder(?:\s+for me)?|schedule(?:\s+a)?\s+reminder(?:\s+for me)?)";

static BLANK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^\s*$").unwrap());

static REMINDER_EXPLICIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^(?:please\s+)?{REMINDER_VERB}\s+(?:for me\s+)?to\s+(.+?)\s+(tomorrow|today|tonight|monday|tuesday|wednesday|thursday|friday|saturday|sunday)\s+at\s+(.+)$"
    ))
    .unwrap()
});

static REMINDER_RELATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^(?:please\s+)?{REMINDER_VERB}\s+(?:for me\s+)?to\s+(.+?)\s+in\s+(\d+)\s*(minutes?|hours?|days?)$"))
        .unwrap()
});

static REMINDER_TOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^(?:please\s+)?{REMINDER_VERB}\s+(?:for me\s+)?to\s+(.+?)\s+tomorrow\s+(morning|afternoon|evening)$"))
        .unwrap()
});

static REMINDER_SIMPLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)^(?:please\s+)?{REMINDER_VERB}\s+(?:for me\s+)?to\s+(.+)$")).unwrap());

static GOAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:my goal is to|goal:)\s*(.+)$").unwrap());
static MEMORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*remember that\s+(.+)$").unwrap());

/// Conservative action-keyword heuristic backing the deterministic-NOOP
/// invariant — phrases that look like an action request but don't fit any
/// concrete rule above. Matched anywhere in the text, not just at the
/// start, since "Ping me about X tomorrow" has no reminder-verb prefix.
///
/// Deliberately excludes bare "remind"/"reminder" — those negative-guard
/// phrasings ("how do I set a reminder?", "I set a reminder once") must
/// fall through to `chat`, not get caught by this heuristic.
static NOOP_HINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(ping me|nudge me|notify me|alert me|goal|remember that|save this)").unwrap()
});

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule { kind: RuleKind::Blank, pattern: &BLANK_RE },
        Rule { kind: RuleKind::ReminderExplicit, pattern: &REMINDER_EXPLICIT_RE },
        Rule { kind: RuleKind::ReminderRelative, pattern: &REMINDER_RELATIVE_RE },
        Rule { kind: RuleKind::ReminderTimeOfDay, pattern: &REMINDER_TOD_RE },
        Rule { kind: RuleKind::ReminderSimple, pattern: &REMINDER_SIMPLE_RE },
        Rule { kind: RuleKind::Goal, pattern: &GOAL_RE },
        Rule { kind: RuleKind::Memory, pattern: &MEMORY_RE },
        Rule { kind: RuleKind::NoopHint, pattern: &NOOP_HINT_RE },
    ]
});

/// Normalize raw text into an `Intent`, evaluated against `now` so relative
/// and explicit due dates resolve deterministically.
pub fn normalize(text: &str, now: DateTime<Utc>) -> Intent {
    for rule in RULES.iter() {
        if let Some(captures) = rule.pattern.captures(text) {
            return build_intent(rule.kind, text, &captures, now);
        }
    }

    Intent { kind: IntentKind::Chat, confidence: 0.6, surface_form: text.to_string(), fields: IntentFields::default() }
}

fn build_intent(kind: RuleKind, text: &str, captures: &Captures, now: DateTime<Utc>) -> Intent {
    match kind {
        RuleKind::Blank => {
            Intent { kind: IntentKind::Noop, confidence: 1.0, surface_form: text.to_string(), fields: IntentFields::default() }
        }
        RuleKind::ReminderExplicit => {
            let task = captures.get(1).map(|m| m.as_str().trim().to_string());
            let day_ref = captures.get(2).map(|m| m.as_str()).unwrap_or("today");
            let time_clause = captures.get(3).map(|m| m.as_str().trim()).unwrap_or("");
            let due_epoch = resolve_named_day(day_ref, now).and_then(|date| apply_clock_time(date, time_clause));
            let needs_clarification = due_epoch.is_none();
            Intent {
                kind: IntentKind::ReminderCreate,
                confidence: if needs_clarification { 0.5 } else { 0.95 },
                surface_form: "set_reminder_explicit".to_string(),
                fields: IntentFields {
                    task,
                    due_epoch,
                    needs_clarification,
                    clarification_prompt: needs_clarification.then(|| "When should I remind you?".to_string()),
                },
            }
        }
        RuleKind::ReminderRelative => {
            let task = captures.get(1).map(|m| m.as_str().trim().to_string());
            let amount: i64 = captures.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
            let unit = captures.get(3).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
            let delta = match unit.trim_end_matches('s') {
                "minute" => Duration::minutes(amount),
                "hour" => Duration::hours(amount),
                "day" => Duration::days(amount),
                _ => Duration::zero(),
            };
            Intent {
                kind: IntentKind::ReminderCreate,
                confidence: 0.9,
                surface_form: "set_reminder_relative".to_string(),
                fields: IntentFields { task, due_epoch: Some((now + delta).timestamp()), needs_clarification: false, clarification_prompt: None },
            }
        }
        RuleKind::ReminderTimeOfDay => {
            let task = captures.get(1).map(|m| m.as_str().trim().to_string());
            Intent {
                kind: IntentKind::ReminderCreate,
                confidence: 0.7,
                surface_form: "set_reminder_time_of_day".to_string(),
                fields: IntentFields {
                    task,
                    due_epoch: None,
                    needs_clarification: true,
                    clarification_prompt: Some("What time tomorrow would you like to be reminded?".to_string()),
                },
            }
        }
        RuleKind::ReminderSimple => Intent {
            kind: IntentKind::ReminderCreate,
            confidence: 0.6,
            surface_form: "set_reminder_simple".to_string(),
            fields: IntentFields {
                task: captures.get(1).map(|m| m.as_str().trim().to_string()),
                due_epoch: None,
                needs_clarification: true,
                clarification_prompt: Some("When would you like to be reminded?".to_string()),
            },
        },
        RuleKind::Goal => Intent {
            kind: IntentKind::GoalCreate,
            confidence: 0.9,
            surface_form: text.to_string(),
            fields: IntentFields { task: captures.get(1).map(|m| m.as_str().trim().to_string()), ..IntentFields::default() },
        },
        RuleKind::Memory => Intent {
            kind: IntentKind::MemoryAdd,
            confidence: 0.9,
            surface_form: text.to_string(),
            fields: IntentFields { task: captures.get(1).map(|m| m.as_str().trim().to_string()), ..IntentFields::default() },
        },
        RuleKind::NoopHint => {
            let hint = captures.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
            Intent {
                kind: IntentKind::Noop,
                confidence: 0.5,
                surface_form: text.to_string(),
                fields: IntentFields { task: Some(hint_to_category(&hint).to_string()), ..IntentFields::default() },
            }
        }
    }
}

fn hint_to_category(hint: &str) -> &'static str {
    if hint.contains("goal") {
        "goal"
    } else if hint.contains("remember") || hint.contains("save this") {
        "memory"
    } else {
        "reminder"
    }
}

/// Resolve "tomorrow"/"today"/"tonight"/a weekday name to a concrete date.
fn resolve_named_day(day_ref: &str, now: DateTime<Utc>) -> Option<NaiveDate> {
    let today = now.date_naive();
    match day_ref.to_lowercase().as_str() {
        "today" | "tonight" => Some(today),
        "tomorrow" => Some(today + Duration::days(1)),
        weekday_name => {
            let target = parse_weekday(weekday_name)?;
            let mut candidate = today;
            for _ in 0..7 {
                candidate += Duration::days(1);
                if candidate.weekday() == target {
                    return Some(candidate);
                }
            }
            None
        }
    }
}

fn parse_weekday(name: &str) -> Option<Weekday> {
    match name {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Apply a "4:30 PM" / "16:30" clock-time clause onto a concrete date.
fn apply_clock_time(date: NaiveDate, text: &str) -> Option<i64> {
    static CLOCK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)^(\d{1,2})(?::(\d{2}))?\s*(am|pm)?\.?$").unwrap());
    let text = text.trim().trim_end_matches('.');
    let captures = CLOCK_RE.captures(text)?;
    let mut hour: u32 = captures.get(1)?.as_str().parse().ok()?;
    let minute: u32 = captures.get(2).map(|m| m.as_str()).unwrap_or("0").parse().ok()?;
    if let Some(meridiem) = captures.get(3) {
        let is_pm = meridiem.as_str().eq_ignore_ascii_case("pm");
        hour %= 12;
        if is_pm {
            hour += 12;
        }
    }
    let naive = date.and_hms_opt(hour, minute, 0)?;
    Some(Utc.from_utc_datetime(&naive).timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        // 2026-01-26T10:00:00Z, matching a fixed reference timestamp.
        Utc.with_ymd_and_hms(2026, 1, 26, 10, 0, 0).unwrap()
    }

    #[test]
    fn explicit_reminder_resolves_due_epoch_against_fixed_now() {
        let intent = normalize("Set a reminder for me to submit my expense reimbursement tomorrow at 4:30 PM", fixed_now());
        assert_eq!(intent.kind, IntentKind::ReminderCreate);
        assert_eq!(intent.surface_form, "set_reminder_explicit");
        assert!((intent.confidence - 0.95).abs() < f32::EPSILON);
        let expected = Utc.with_ymd_and_hms(2026, 1, 27, 16, 30, 0).unwrap().timestamp();
        assert_eq!(intent.fields.due_epoch, Some(expected));
    }

    #[test]
    fn action_intent_noop_matches_spec_scenario_one() {
        let intent = normalize("Ping me about my expense reimbursement tomorrow", fixed_now());
        assert_eq!(intent.kind, IntentKind::Noop);
        assert_eq!(intent.fields.task.as_deref(), Some("reminder"));
    }

    #[test]
    fn relative_reminder_resolves_due_epoch() {
        let intent = normalize("remind me to call mom in 20 minutes", fixed_now());
        assert_eq!(intent.kind, IntentKind::ReminderCreate);
        assert!(!intent.fields.needs_clarification);
        assert_eq!(intent.fields.task.as_deref(), Some("call mom"));
        assert_eq!(intent.fields.due_epoch, Some((fixed_now() + Duration::minutes(20)).timestamp()));
    }

    #[test]
    fn time_of_day_reminder_needs_clarification() {
        let intent = normalize("remind me to stretch tomorrow morning", fixed_now());
        assert_eq!(intent.kind, IntentKind::ReminderCreate);
        assert!(intent.fields.needs_clarification);
        assert_eq!(intent.confidence, 0.7);
    }

    #[test]
    fn simple_reminder_without_time_needs_clarification() {
        let intent = normalize("remind me to water the plants", fixed_now());
        assert_eq!(intent.kind, IntentKind::ReminderCreate);
        assert!(intent.fields.needs_clarification);
        assert_eq!(intent.confidence, 0.6);
    }

    #[test]
    fn goal_create_captures_task() {
        let intent = normalize("my goal is to run a marathon", fixed_now());
        assert_eq!(intent.kind, IntentKind::GoalCreate);
        assert_eq!(intent.fields.task.as_deref(), Some("run a marathon"));
    }

    #[test]
    fn memory_add_captures_fact() {
        let intent = normalize("remember that I'm allergic to peanuts", fixed_now());
        assert_eq!(intent.kind, IntentKind::MemoryAdd);
        assert_eq!(intent.fields.task.as_deref(), Some("I'm allergic to peanuts"));
    }

    #[test]
    fn blank_text_is_noop_with_full_confidence() {
        let intent = normalize("   ", fixed_now());
        assert_eq!(intent.kind, IntentKind::Noop);
        assert_eq!(intent.confidence, 1.0);
    }

    #[test]
    fn unmatched_text_falls_back_to_chat() {
        let intent = normalize("what's the weather like today?", fixed_now());
        assert_eq!(intent.kind, IntentKind::Chat);
    }

    #[test]
    fn negative_guard_question_form_is_chat() {
        let intent = normalize("how do I set a reminder?", fixed_now());
        assert_eq!(intent.kind, IntentKind::Chat);
    }

    #[test]
    fn negative_guard_past_tense_is_chat() {
        let intent = normalize("I set a reminder once", fixed_now());
        assert_eq!(intent.kind, IntentKind::Chat);
    }

    #[test]
    fn negative_guard_abstract_phrase_is_chat() {
        let intent = normalize("set a reminder system", fixed_now());
        assert_eq!(intent.kind, IntentKind::Chat);
    }

    #[test]
    fn explicit_rule_wins_over_simple_rule_on_overlap() {
        // Matches both the explicit-time and simple reminder patterns;
        // priority order must select the explicit surface form.
        let intent = normalize("remind me to call mom tomorrow at 9am", fixed_now());
        assert_eq!(intent.surface_form, "set_reminder_explicit");
    }

    #[test]
    fn normalize_is_pure_and_deterministic() {
        let a = normalize("remind me to call mom in 20 minutes", fixed_now());
        let b = normalize("remind me to call mom in 20 minutes", fixed_now());
        assert_eq!(a.fields.due_epoch, b.fields.due_epoch);
    }
}

//! Reminder rules and due-reminder derivation.
//!
//! # Responsibility
//! - Parse and format signed ISO-8601 reminder offsets (`-PT1H`).
//! - Derive reminder fire instants from a routine's next occurrence.
//!
//! # Invariants
//! - Fire instants are always derived from the routine's current
//!   `next_occurrence`; nothing is cached across occurrences.
//! - A `ReminderBatch` remembers the occurrence and aggregate version it was
//!   derived from so stale batches can be detected before delivery.
//! - Only `Active` routines produce reminders.

use crate::collab::notification::TemplateKey;
use crate::model::routine::{Routine, RoutineId, RoutineStatus};
use chrono::{DateTime, TimeDelta, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

static OFFSET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([+-])?P(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$",
    )
    .expect("valid offset regex")
});

/// One reminder attached to a routine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRule {
    /// Signed offset from the occurrence start; negative fires before it.
    #[serde(with = "iso_offset")]
    pub offset: TimeDelta,
    pub template: TemplateKey,
}

impl ReminderRule {
    pub fn new(offset: TimeDelta, template: TemplateKey) -> Self {
        Self { offset, template }
    }

    /// Builds a rule from ISO-8601 offset text, e.g. `-PT15M`.
    pub fn parse(offset: &str, template: TemplateKey) -> Result<Self, OffsetParseError> {
        Ok(Self::new(parse_offset(offset)?, template))
    }
}

/// A reminder that should fire at `fire_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueReminder {
    pub fire_at: DateTime<Utc>,
    pub template: TemplateKey,
    pub offset: TimeDelta,
}

/// Due reminders tied to the occurrence and version they were computed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderBatch {
    pub routine_id: RoutineId,
    pub occurrence: Option<DateTime<Utc>>,
    pub version: i64,
    pub reminders: Vec<DueReminder>,
}

impl ReminderBatch {
    /// Returns whether this batch still matches the routine's schedule.
    ///
    /// A batch derived for a superseded occurrence must not be delivered.
    pub fn is_current_for(&self, routine: &Routine) -> bool {
        self.routine_id == routine.id
            && self.version == routine.version
            && self.occurrence == routine.next_occurrence
    }
}

/// Returns reminders of `routine` whose fire instant is still after `now`,
/// ordered by fire instant.
pub fn due_reminders(routine: &Routine, now: DateTime<Utc>) -> Vec<DueReminder> {
    if routine.status != RoutineStatus::Active {
        return Vec::new();
    }
    let Some(occurrence) = routine.next_occurrence else {
        return Vec::new();
    };

    let mut due = routine
        .reminder_rules
        .iter()
        .filter_map(|rule| {
            let fire_at = occurrence.checked_add_signed(rule.offset)?;
            (fire_at > now).then_some(DueReminder {
                fire_at,
                template: rule.template,
                offset: rule.offset,
            })
        })
        .collect::<Vec<_>>();
    due.sort_by_key(|reminder| reminder.fire_at);
    due
}

/// Derives the due set together with the schedule state it belongs to.
pub fn reminder_batch(routine: &Routine, now: DateTime<Utc>) -> ReminderBatch {
    ReminderBatch {
        routine_id: routine.id,
        occurrence: routine.next_occurrence,
        version: routine.version,
        reminders: due_reminders(routine, now),
    }
}

/// Parses a signed ISO-8601 duration limited to weeks, days, hours, minutes
/// and seconds. Years and months are rejected because their length varies.
pub fn parse_offset(value: &str) -> Result<TimeDelta, OffsetParseError> {
    let trimmed = value.trim();
    let invalid = || OffsetParseError::Invalid(trimmed.to_string());
    let caps = OFFSET_RE.captures(trimmed).ok_or_else(invalid)?;

    let mut seconds: i64 = 0;
    let mut any_component = false;
    for (index, unit_seconds) in [(2, 604_800), (3, 86_400), (4, 3_600), (5, 60), (6, 1)] {
        if let Some(matched) = caps.get(index) {
            any_component = true;
            let amount = matched
                .as_str()
                .parse::<i64>()
                .map_err(|_| OffsetParseError::OutOfRange(trimmed.to_string()))?;
            seconds = amount
                .checked_mul(unit_seconds)
                .and_then(|part| seconds.checked_add(part))
                .ok_or_else(|| OffsetParseError::OutOfRange(trimmed.to_string()))?;
        }
    }
    if !any_component || trimmed.ends_with('T') {
        return Err(invalid());
    }

    if caps.get(1).is_some_and(|sign| sign.as_str() == "-") {
        seconds = -seconds;
    }
    TimeDelta::try_seconds(seconds).ok_or_else(|| OffsetParseError::OutOfRange(trimmed.to_string()))
}

/// Formats an offset in the canonical form accepted by `parse_offset`.
pub fn format_offset(offset: TimeDelta) -> String {
    let total = offset.num_seconds();
    if total == 0 {
        return "PT0S".to_string();
    }
    let sign = if total < 0 { "-" } else { "" };
    let mut rest = total.unsigned_abs();
    let days = rest / 86_400;
    rest %= 86_400;
    let hours = rest / 3_600;
    rest %= 3_600;
    let minutes = rest / 60;
    let seconds = rest % 60;

    let mut out = format!("{sign}P");
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || seconds > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if seconds > 0 {
            out.push_str(&format!("{seconds}S"));
        }
    }
    out
}

/// Reminder offset parse failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OffsetParseError {
    Invalid(String),
    OutOfRange(String),
}

impl Display for OffsetParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid(value) => write!(
                f,
                "invalid reminder offset `{value}`; expected e.g. -PT1H, P1D, -P1DT30M"
            ),
            Self::OutOfRange(value) => write!(f, "reminder offset `{value}` is out of range"),
        }
    }
}

impl Error for OffsetParseError {}

mod iso_offset {
    use super::{format_offset, parse_offset};
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(offset: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_offset(*offset))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeDelta, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_offset(&text).map_err(serde::de::Error::custom)
    }
}

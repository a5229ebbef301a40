//! Routine aggregate root.
//!
//! # Responsibility
//! - Define the canonical record for a scheduled activity and its participants.
//! - Provide validation and small mutation helpers used by services.
//!
//! # Invariants
//! - Recurring schedules carry a recurrence rule; single occurrences carry none.
//! - `next_occurrence` is derived state and is only written by the lifecycle
//!   helpers (`crate::lifecycle`).
//! - `version` is owned by the repository and grows by one per successful save.
//! - `end` should not be earlier than `start` when set.

use crate::collab::notification::TemplateKey;
use crate::model::participant::{Participant, ParticipantKey};
use crate::recurrence::{RecurrenceRule, RuleParseError};
use crate::reminder::ReminderRule;
use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for every routine.
pub type RoutineId = Uuid;
/// Identifier of a user in the external identity provider.
pub type UserId = Uuid;
/// Identifier of a team in the external identity provider.
pub type TeamId = Uuid;

/// Locale tag to display text, e.g. `{"en": "Standup", "fa": "..."}`.
pub type LocalizedText = BTreeMap<String, String>;

/// Routine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutineStatus {
    Active,
    Paused,
    Completed,
    Archived,
    Cancelled,
}

impl RoutineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Archived => "archived",
            Self::Cancelled => "cancelled",
        }
    }

    /// Statuses that never carry a next occurrence.
    pub fn clears_occurrence(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl Display for RoutineStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who may see a routine in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Listed for everyone.
    Public,
    /// Listed for the creator and user participants.
    Participants,
    /// Listed for the creator only.
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Recurring,
    SingleOccurrence,
}

/// Owning principal of a routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Owner {
    User(UserId),
    Team(TeamId),
}

/// Creator of a routine: the owning principal and the user who acted for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub owner: Owner,
    /// For `Owner::User` this is normally the same user.
    pub acted_by: UserId,
}

impl Creator {
    pub fn user(user_id: UserId) -> Self {
        Self {
            owner: Owner::User(user_id),
            acted_by: user_id,
        }
    }

    pub fn team(team_id: TeamId, acted_by: UserId) -> Self {
        Self {
            owner: Owner::Team(team_id),
            acted_by,
        }
    }
}

/// Where a routine takes place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
    Physical {
        address: String,
    },
    Online {
        platform: String,
        url: Option<String>,
    },
}

/// Checklist item attached to a routine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineTask {
    pub id: Uuid,
    pub title: String,
    pub completed: bool,
}

impl RoutineTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            completed: false,
        }
    }
}

/// Canonical aggregate for one scheduled activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Routine {
    pub id: RoutineId,
    pub title: LocalizedText,
    /// Opaque reference into the descriptive-content store.
    pub description_ref: Option<String>,
    pub creator: Creator,
    pub status: RoutineStatus,
    pub visibility: Visibility,
    pub schedule_type: ScheduleType,
    /// Wall-clock start of the first occurrence, interpreted in `timezone`.
    pub start: NaiveDateTime,
    /// Wall-clock end of the whole series, interpreted in `timezone`.
    pub end: Option<NaiveDateTime>,
    /// Meaningful only when `schedule_type == ScheduleType::Recurring`.
    pub recurrence_rule: Option<RecurrenceRule>,
    pub duration_minutes: u32,
    pub timezone: Tz,
    /// Derived; see `crate::lifecycle::recompute_next_occurrence`.
    pub next_occurrence: Option<DateTime<Utc>>,
    pub purpose: Option<String>,
    pub location: Option<Location>,
    pub participants: Vec<Participant>,
    pub max_participants: Option<u32>,
    pub rsvp_required: bool,
    pub tasks: Vec<RoutineTask>,
    pub linked_project: Option<Uuid>,
    pub linked_team: Option<TeamId>,
    pub reminder_rules: Vec<ReminderRule>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token.
    pub version: i64,
}

impl Routine {
    /// Creates an active single-occurrence routine with a generated ID.
    ///
    /// # Invariants
    /// - `next_occurrence` starts as `None`; callers compute it through the
    ///   lifecycle helpers before persisting.
    /// - Duration defaults to 60 minutes.
    pub fn new(
        title: LocalizedText,
        creator: Creator,
        start: NaiveDateTime,
        timezone: Tz,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            description_ref: None,
            creator,
            status: RoutineStatus::Active,
            visibility: Visibility::Participants,
            schedule_type: ScheduleType::SingleOccurrence,
            start,
            end: None,
            recurrence_rule: None,
            duration_minutes: 60,
            timezone,
            next_occurrence: None,
            purpose: None,
            location: None,
            participants: Vec::new(),
            max_participants: None,
            rsvp_required: false,
            tasks: Vec::new(),
            linked_project: None,
            linked_team: None,
            reminder_rules: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Switches the schedule to recurring with the given rule.
    pub fn with_recurrence(mut self, rule: RecurrenceRule) -> Self {
        self.schedule_type = ScheduleType::Recurring;
        self.recurrence_rule = Some(rule);
        self
    }

    /// Validates aggregate invariants before persistence.
    pub fn validate(&self) -> Result<(), RoutineValidationError> {
        if !self.title.values().any(|text| !text.trim().is_empty()) {
            return Err(RoutineValidationError::EmptyTitle);
        }
        if self.duration_minutes == 0 {
            return Err(RoutineValidationError::ZeroDuration);
        }
        if let Some(end) = self.end {
            if end < self.start {
                return Err(RoutineValidationError::EndBeforeStart {
                    start: self.start,
                    end,
                });
            }
        }

        match (self.schedule_type, self.recurrence_rule.as_ref()) {
            (ScheduleType::Recurring, None) => {
                return Err(RoutineValidationError::MissingRecurrenceRule);
            }
            (ScheduleType::SingleOccurrence, Some(_)) => {
                return Err(RoutineValidationError::UnexpectedRecurrenceRule);
            }
            (ScheduleType::Recurring, Some(rule)) => {
                rule.validate()
                    .map_err(RoutineValidationError::InvalidRecurrenceRule)?;
            }
            (ScheduleType::SingleOccurrence, None) => {}
        }

        if let Some(rule) = self.reminder_rules.iter().find(|r| !r.template.is_reminder()) {
            return Err(RoutineValidationError::NonReminderTemplate(rule.template));
        }

        let mut seen = HashSet::with_capacity(self.participants.len());
        for participant in &self.participants {
            if !seen.insert(participant.key()) {
                return Err(RoutineValidationError::DuplicateParticipant(
                    participant.key(),
                ));
            }
        }

        if let Some(max) = self.max_participants {
            if max == 0 {
                return Err(RoutineValidationError::ZeroCapacity);
            }
            let counted = self.counted_participants();
            if counted > max as usize {
                return Err(RoutineValidationError::CapacityExceeded { max, counted });
            }
        }

        Ok(())
    }

    pub fn participant(&self, key: ParticipantKey) -> Option<&Participant> {
        self.participants.iter().find(|p| p.key() == key)
    }

    pub fn participant_mut(&mut self, key: ParticipantKey) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.key() == key)
    }

    /// Number of participants occupying a capacity slot.
    pub fn counted_participants(&self) -> usize {
        self.participants
            .iter()
            .filter(|p| p.counts_toward_capacity())
            .count()
    }

    /// Returns whether `user_id` holds the given organizer role label as a
    /// user participant.
    pub fn has_participant_role(&self, user_id: UserId, role: &str) -> bool {
        self.participant(ParticipantKey::user(user_id))
            .is_some_and(|p| p.role.eq_ignore_ascii_case(role))
    }

    /// Bumps the modification timestamp.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

/// Aggregate validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutineValidationError {
    EmptyTitle,
    ZeroDuration,
    EndBeforeStart {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    MissingRecurrenceRule,
    UnexpectedRecurrenceRule,
    InvalidRecurrenceRule(RuleParseError),
    NonReminderTemplate(TemplateKey),
    DuplicateParticipant(ParticipantKey),
    ZeroCapacity,
    CapacityExceeded {
        max: u32,
        counted: usize,
    },
}

impl Display for RoutineValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "routine title must have at least one non-blank entry"),
            Self::ZeroDuration => write!(f, "routine duration must be positive"),
            Self::EndBeforeStart { start, end } => {
                write!(f, "routine end {end} is earlier than start {start}")
            }
            Self::MissingRecurrenceRule => {
                write!(f, "recurring routine requires a recurrence rule")
            }
            Self::UnexpectedRecurrenceRule => {
                write!(f, "single-occurrence routine must not carry a recurrence rule")
            }
            Self::InvalidRecurrenceRule(err) => write!(f, "invalid recurrence rule: {err}"),
            Self::NonReminderTemplate(key) => {
                write!(f, "template `{}` cannot be used for reminders", key.as_str())
            }
            Self::DuplicateParticipant(key) => write!(f, "duplicate participant: {key}"),
            Self::ZeroCapacity => write!(f, "max_participants must be at least 1"),
            Self::CapacityExceeded { max, counted } => write!(
                f,
                "routine has {counted} participants but max_participants is {max}"
            ),
        }
    }
}

impl Error for RoutineValidationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidRecurrenceRule(err) => Some(err),
            _ => None,
        }
    }
}

//! Routine lifecycle use-case service.
//!
//! # Responsibility
//! - Create routines and manage their status and schedule.
//! - Keep `next_occurrence` current on every write and notify afterwards.
//!
//! # Invariants
//! - Every mutation recomputes on the in-memory aggregate and persists the
//!   aggregate with its derived values in one versioned save.
//! - Status and schedule changes require organizer rights.
//! - Notifications are dispatched only after a successful save.

use crate::collab::notification::NotificationEvent;
use crate::lifecycle::{apply_status, recompute_next_occurrence, seed_next_occurrence, RecomputeOutcome};
use crate::model::participant::{InvitationStatus, Participant, ParticipantKey};
use crate::model::routine::{
    Creator, LocalizedText, Location, Owner, Routine, RoutineId, RoutineStatus, RoutineTask,
    RoutineValidationError, ScheduleType, TeamId, UserId, Visibility,
};
use crate::recurrence::RecurrenceRule;
use crate::reminder::{reminder_batch, ReminderBatch, ReminderRule};
use crate::repo::routine_repo::{RepoError, RoutineRepository};
use crate::service::context::{all_recipients, ServiceEnv};
use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Errors from routine use-case services.
#[derive(Debug)]
pub enum RoutineServiceError {
    Validation(RoutineValidationError),
    RoutineNotFound(RoutineId),
    ParticipantNotFound {
        routine_id: RoutineId,
        participant: ParticipantKey,
    },
    /// The identity provider does not know this user or team.
    IdentityNotFound(ParticipantKey),
    Unauthorized {
        actor: UserId,
        routine_id: Option<RoutineId>,
    },
    DuplicateParticipant(ParticipantKey),
    CapacityExceeded {
        max: u32,
        counted: usize,
    },
    /// `Invited` is not an answer.
    InvalidRsvpStatus(InvitationStatus),
    InvalidRange {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    /// Another writer saved the routine first; reload and retry.
    VersionConflict {
        id: RoutineId,
        expected: i64,
    },
    Repo(RepoError),
}

impl Display for RoutineServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::RoutineNotFound(id) => write!(f, "routine not found: {id}"),
            Self::ParticipantNotFound {
                routine_id,
                participant,
            } => write!(f, "participant {participant} not found in routine {routine_id}"),
            Self::IdentityNotFound(key) => write!(f, "unknown identity: {key}"),
            Self::Unauthorized {
                actor,
                routine_id: Some(routine_id),
            } => write!(f, "user {actor} is not allowed to modify routine {routine_id}"),
            Self::Unauthorized {
                actor,
                routine_id: None,
            } => write!(f, "user {actor} is not allowed to perform this action"),
            Self::DuplicateParticipant(key) => write!(f, "participant already present: {key}"),
            Self::CapacityExceeded { max, counted } => write!(
                f,
                "routine is full: {counted} participants, max_participants is {max}"
            ),
            Self::InvalidRsvpStatus(status) => {
                write!(f, "`{}` is not a valid rsvp answer", status.as_str())
            }
            Self::InvalidRange { from, to } => {
                write!(f, "invalid range: `from` {from} must be before `to` {to}")
            }
            Self::VersionConflict { id, expected } => write!(
                f,
                "routine {id} was modified concurrently; expected version {expected}"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RoutineServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RoutineValidationError> for RoutineServiceError {
    fn from(value: RoutineValidationError) -> Self {
        match value {
            RoutineValidationError::DuplicateParticipant(key) => Self::DuplicateParticipant(key),
            RoutineValidationError::CapacityExceeded { max, counted } => {
                Self::CapacityExceeded { max, counted }
            }
            other => Self::Validation(other),
        }
    }
}

impl From<RepoError> for RoutineServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => err.into(),
            RepoError::NotFound(id) => Self::RoutineNotFound(id),
            RepoError::VersionConflict { id, expected } => Self::VersionConflict { id, expected },
            other => Self::Repo(other),
        }
    }
}

/// Input for `RoutineService::create_routine`.
///
/// The schedule type follows from `recurrence_rule`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRoutine {
    pub title: LocalizedText,
    pub description_ref: Option<String>,
    pub owner: Owner,
    pub visibility: Visibility,
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
    pub recurrence_rule: Option<RecurrenceRule>,
    pub duration_minutes: u32,
    pub timezone: Tz,
    pub purpose: Option<String>,
    pub location: Option<Location>,
    pub participants: Vec<Participant>,
    pub max_participants: Option<u32>,
    pub rsvp_required: bool,
    pub tasks: Vec<RoutineTask>,
    pub linked_project: Option<Uuid>,
    pub linked_team: Option<TeamId>,
    pub reminder_rules: Vec<ReminderRule>,
    /// Usually `Active`; drafts may start `Paused`.
    pub status: RoutineStatus,
}

impl NewRoutine {
    pub fn new(title: LocalizedText, owner: Owner, start: NaiveDateTime, timezone: Tz) -> Self {
        Self {
            title,
            description_ref: None,
            owner,
            visibility: Visibility::Participants,
            start,
            end: None,
            recurrence_rule: None,
            duration_minutes: 60,
            timezone,
            purpose: None,
            location: None,
            participants: Vec::new(),
            max_participants: None,
            rsvp_required: false,
            tasks: Vec::new(),
            linked_project: None,
            linked_team: None,
            reminder_rules: Vec::new(),
            status: RoutineStatus::Active,
        }
    }

    pub fn recurring(mut self, rule: RecurrenceRule) -> Self {
        self.recurrence_rule = Some(rule);
        self
    }

    fn into_routine(self, acted_by: UserId, now: DateTime<Utc>) -> Routine {
        let creator = match self.owner {
            Owner::User(user_id) => Creator {
                owner: Owner::User(user_id),
                acted_by,
            },
            Owner::Team(team_id) => Creator::team(team_id, acted_by),
        };
        let mut routine = Routine::new(self.title, creator, self.start, self.timezone, now);
        routine.schedule_type = if self.recurrence_rule.is_some() {
            ScheduleType::Recurring
        } else {
            ScheduleType::SingleOccurrence
        };
        routine.recurrence_rule = self.recurrence_rule;
        routine.description_ref = self.description_ref;
        routine.status = self.status;
        routine.visibility = self.visibility;
        routine.end = self.end;
        routine.duration_minutes = self.duration_minutes;
        routine.purpose = self.purpose;
        routine.location = self.location;
        routine.participants = self.participants;
        routine.max_participants = self.max_participants;
        routine.rsvp_required = self.rsvp_required;
        routine.tasks = self.tasks;
        routine.linked_project = self.linked_project;
        routine.linked_team = self.linked_team;
        routine.reminder_rules = self.reminder_rules;
        routine
    }
}

/// Partial schedule update. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleEdit {
    pub start: Option<NaiveDateTime>,
    /// `Some(None)` clears the series end.
    pub end: Option<Option<NaiveDateTime>>,
    /// `Some(None)` turns the routine into a single occurrence.
    pub recurrence_rule: Option<Option<RecurrenceRule>>,
    pub duration_minutes: Option<u32>,
    pub timezone: Option<Tz>,
}

impl ScheduleEdit {
    fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    fn apply(self, routine: &mut Routine) {
        if let Some(start) = self.start {
            routine.start = start;
        }
        if let Some(end) = self.end {
            routine.end = end;
        }
        if let Some(rule) = self.recurrence_rule {
            routine.schedule_type = if rule.is_some() {
                ScheduleType::Recurring
            } else {
                ScheduleType::SingleOccurrence
            };
            routine.recurrence_rule = rule;
        }
        if let Some(duration) = self.duration_minutes {
            routine.duration_minutes = duration;
        }
        if let Some(timezone) = self.timezone {
            routine.timezone = timezone;
        }
    }
}

/// Routine lifecycle service facade.
pub struct RoutineService<R: RoutineRepository> {
    repo: R,
    env: ServiceEnv,
}

impl<R: RoutineRepository> RoutineService<R> {
    /// Creates service from repository implementation and environment.
    pub fn new(repo: R, env: ServiceEnv) -> Self {
        Self { repo, env }
    }

    /// Creates and persists one routine on behalf of `actor`.
    ///
    /// Routines in any non-terminal status get their first
    /// `next_occurrence` before the insert.
    /// Initial participants are invited after the routine is stored.
    pub fn create_routine(
        &self,
        input: NewRoutine,
        actor: UserId,
    ) -> Result<Routine, RoutineServiceError> {
        self.ensure_can_create(input.owner, actor)?;
        for participant in &input.participants {
            if !self.env.identity.participant_exists(participant.key()) {
                return Err(RoutineServiceError::IdentityNotFound(participant.key()));
            }
        }

        let now = self.env.now();
        let mut routine = input.into_routine(actor, now);
        routine.validate()?;
        seed_next_occurrence(&mut routine, now, &self.env.config.evaluation);
        self.repo.create_routine(&routine)?;

        info!(
            "event=routine_create module=service status=ok routine_id={} schedule={} participants={} has_next={}",
            routine.id,
            schedule_label(routine.schedule_type),
            routine.participants.len(),
            routine.next_occurrence.is_some()
        );

        for participant in &routine.participants {
            self.env.notify(
                &[participant.key().into()],
                &NotificationEvent::ParticipantInvited {
                    routine_id: routine.id,
                    participant: participant.key(),
                    role: participant.role.clone(),
                },
            );
        }
        Ok(routine)
    }

    /// Loads one routine.
    pub fn get_routine(&self, id: RoutineId) -> Result<Routine, RoutineServiceError> {
        self.repo
            .get_routine(id)?
            .ok_or(RoutineServiceError::RoutineNotFound(id))
    }

    /// Moves a routine to `to`.
    ///
    /// Moving to the current status returns the routine unchanged and emits
    /// nothing.
    pub fn change_status(
        &self,
        id: RoutineId,
        to: RoutineStatus,
        actor: UserId,
    ) -> Result<Routine, RoutineServiceError> {
        let mut routine = self.get_routine(id)?;
        self.ensure_organizer(&routine, actor)?;

        let now = self.env.now();
        let Some(transition) = apply_status(&mut routine, to, now, &self.env.config.evaluation)
        else {
            return Ok(routine);
        };
        routine.version = self.repo.save_routine(&routine)?;

        info!(
            "event=routine_status module=service status=ok routine_id={} from={} to={} version={}",
            routine.id, transition.from, transition.to, routine.version
        );
        self.env.notify(
            &all_recipients(&routine),
            &NotificationEvent::StatusChanged {
                routine_id: routine.id,
                from: transition.from,
                to: transition.to,
            },
        );
        Ok(routine)
    }

    /// Applies a schedule edit, re-validates, and recomputes when Active.
    pub fn edit_schedule(
        &self,
        id: RoutineId,
        edit: ScheduleEdit,
        actor: UserId,
    ) -> Result<Routine, RoutineServiceError> {
        let mut routine = self.get_routine(id)?;
        self.ensure_organizer(&routine, actor)?;
        if edit.is_empty() {
            return Ok(routine);
        }

        let now = self.env.now();
        edit.apply(&mut routine);
        routine.validate()?;
        recompute_next_occurrence(&mut routine, now, &self.env.config.evaluation);
        routine.touch(now);
        routine.version = self.repo.save_routine(&routine)?;

        info!(
            "event=routine_schedule_edit module=service status=ok routine_id={} schedule={} has_next={} version={}",
            routine.id,
            schedule_label(routine.schedule_type),
            routine.next_occurrence.is_some(),
            routine.version
        );
        Ok(routine)
    }

    /// Replaces the reminder rules of one routine.
    pub fn set_reminder_rules(
        &self,
        id: RoutineId,
        rules: Vec<ReminderRule>,
        actor: UserId,
    ) -> Result<Routine, RoutineServiceError> {
        let mut routine = self.get_routine(id)?;
        self.ensure_organizer(&routine, actor)?;
        if routine.reminder_rules == rules {
            return Ok(routine);
        }

        routine.reminder_rules = rules;
        routine.validate()?;
        routine.touch(self.env.now());
        routine.version = self.repo.save_routine(&routine)?;
        Ok(routine)
    }

    /// Re-evaluates `next_occurrence` against the current clock and saves it
    /// when it moved.
    pub fn recompute(&self, id: RoutineId) -> Result<RecomputeOutcome, RoutineServiceError> {
        let mut routine = self.get_routine(id)?;
        let now = self.env.now();
        let outcome = recompute_next_occurrence(&mut routine, now, &self.env.config.evaluation);
        if outcome.changed() {
            routine.touch(now);
            self.repo.save_routine(&routine)?;
        } else if let RecomputeOutcome::Degraded(err) = &outcome {
            warn!(
                "event=routine_recompute module=service status=skip routine_id={} error={}",
                routine.id, err
            );
        }
        Ok(outcome)
    }

    /// Derives the reminders still due for the stored occurrence.
    pub fn reminder_batch(&self, id: RoutineId) -> Result<ReminderBatch, RoutineServiceError> {
        let routine = self.get_routine(id)?;
        Ok(reminder_batch(&routine, self.env.now()))
    }

    fn ensure_can_create(&self, owner: Owner, actor: UserId) -> Result<(), RoutineServiceError> {
        if !self.env.identity.user_exists(actor) {
            return Err(RoutineServiceError::IdentityNotFound(ParticipantKey::user(
                actor,
            )));
        }
        let allowed = match owner {
            Owner::User(user_id) => user_id == actor,
            Owner::Team(team_id) => {
                if !self.env.identity.team_exists(team_id) {
                    return Err(RoutineServiceError::IdentityNotFound(ParticipantKey::team(
                        team_id,
                    )));
                }
                self.env.identity.is_team_admin(team_id, actor)
                    || self.env.identity.is_team_member(team_id, actor)
            }
        };
        if allowed || self.env.identity.is_platform_admin(actor) {
            Ok(())
        } else {
            Err(RoutineServiceError::Unauthorized {
                actor,
                routine_id: None,
            })
        }
    }

    fn ensure_organizer(&self, routine: &Routine, actor: UserId) -> Result<(), RoutineServiceError> {
        if self.env.is_organizer(routine, actor) {
            Ok(())
        } else {
            Err(RoutineServiceError::Unauthorized {
                actor,
                routine_id: Some(routine.id),
            })
        }
    }
}

fn schedule_label(schedule_type: ScheduleType) -> &'static str {
    match schedule_type {
        ScheduleType::Recurring => "recurring",
        ScheduleType::SingleOccurrence => "single",
    }
}

//! Core domain logic for recurring routines.
//! This crate is the single source of truth for schedule, participant and
//! reminder invariants.

pub mod collab;
pub mod config;
pub mod db;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod recurrence;
pub mod reminder;
pub mod repo;
pub mod service;

pub use collab::clock::{Clock, FixedClock, SystemClock};
pub use collab::identity::IdentityProvider;
pub use collab::notification::{
    Notification, NotificationDispatcher, NotificationEvent, Recipient, TemplateKey,
};
pub use config::{ConfigError, EngineConfig};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig};
pub use model::participant::{InvitationStatus, Participant, ParticipantKey, ParticipantKind};
pub use model::routine::{
    Creator, Owner, Routine, RoutineId, RoutineStatus, RoutineValidationError, ScheduleType,
    Visibility,
};
pub use recurrence::{
    next_occurrence, parse_rule, EvaluationLimits, RecurrenceError, RecurrenceRule, RuleParseError,
};
pub use reminder::{due_reminders, DueReminder, ReminderBatch, ReminderRule};
pub use repo::routine_repo::{
    Page, PageRequest, RepoError, RepoResult, RoutineRepository, SqliteRoutineRepository,
    UpcomingQuery, VisibilityScope,
};
pub use service::context::ServiceEnv;
pub use service::participant_service::ParticipantService;
pub use service::query_service::QueryService;
pub use service::routine_service::{NewRoutine, RoutineService, RoutineServiceError, ScheduleEdit};
pub use service::sweep::{SweepReport, SweepService};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}

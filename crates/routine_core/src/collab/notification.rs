//! Typed notification events and the dispatcher contract.
//!
//! # Responsibility
//! - Define the closed set of events the core emits.
//! - Resolve each event to a message template through one lookup table.
//!
//! # Invariants
//! - Template keys are stable strings; renaming one is a breaking change for
//!   the external dispatcher.
//! - Reminder rules may only reference reminder templates.

use crate::model::participant::{InvitationStatus, ParticipantKey, ParticipantKind};
use crate::model::routine::{Owner, RoutineId, RoutineStatus, TeamId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Message template identifiers understood by the notification dispatcher.
///
/// Serialized as the stable string id from `TEMPLATE_TABLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum TemplateKey {
    StatusChanged,
    ParticipantInvited,
    RsvpUpdated,
    ReminderUpcoming,
    ReminderStartingNow,
    ReminderFollowUp,
}

const TEMPLATE_TABLE: &[(TemplateKey, &str)] = &[
    (TemplateKey::StatusChanged, "routine.status_changed"),
    (TemplateKey::ParticipantInvited, "routine.participant_invited"),
    (TemplateKey::RsvpUpdated, "routine.rsvp_updated"),
    (TemplateKey::ReminderUpcoming, "routine.reminder.upcoming"),
    (TemplateKey::ReminderStartingNow, "routine.reminder.starting_now"),
    (TemplateKey::ReminderFollowUp, "routine.reminder.follow_up"),
];

impl TemplateKey {
    pub fn as_str(self) -> &'static str {
        TEMPLATE_TABLE
            .iter()
            .find(|(key, _)| *key == self)
            .map(|(_, name)| *name)
            .unwrap_or("routine.unknown")
    }

    pub fn is_reminder(self) -> bool {
        matches!(
            self,
            Self::ReminderUpcoming | Self::ReminderStartingNow | Self::ReminderFollowUp
        )
    }
}

/// Parses one template key from its stable string id.
pub fn parse_template_key(value: &str) -> Result<TemplateKey, TemplateKeyError> {
    let normalized = value.trim();
    TEMPLATE_TABLE
        .iter()
        .find(|(_, name)| *name == normalized)
        .map(|(key, _)| *key)
        .ok_or_else(|| TemplateKeyError::Unknown(normalized.to_string()))
}

impl From<TemplateKey> for String {
    fn from(value: TemplateKey) -> Self {
        value.as_str().to_string()
    }
}

impl TryFrom<String> for TemplateKey {
    type Error = TemplateKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_template_key(&value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateKeyError {
    Unknown(String),
}

impl Display for TemplateKeyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(value) => write!(f, "unknown notification template `{value}`"),
        }
    }
}

impl Error for TemplateKeyError {}

/// Addressee of one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recipient {
    User(UserId),
    /// Delivered to the team's representatives by the dispatcher.
    Team(TeamId),
}

impl From<ParticipantKey> for Recipient {
    fn from(value: ParticipantKey) -> Self {
        match value.kind {
            ParticipantKind::User => Self::User(value.id),
            ParticipantKind::TeamRepresentative => Self::Team(value.id),
        }
    }
}

impl From<Owner> for Recipient {
    fn from(value: Owner) -> Self {
        match value {
            Owner::User(id) => Self::User(id),
            Owner::Team(id) => Self::Team(id),
        }
    }
}

/// Closed set of events emitted by the routine core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    StatusChanged {
        routine_id: RoutineId,
        from: RoutineStatus,
        to: RoutineStatus,
    },
    ParticipantInvited {
        routine_id: RoutineId,
        participant: ParticipantKey,
        role: String,
    },
    RsvpUpdated {
        routine_id: RoutineId,
        participant: ParticipantKey,
        status: InvitationStatus,
    },
    Reminder {
        routine_id: RoutineId,
        occurrence: DateTime<Utc>,
        fire_at: DateTime<Utc>,
        template: TemplateKey,
    },
}

impl NotificationEvent {
    /// Explicit event → template lookup.
    pub fn template_key(&self) -> TemplateKey {
        match self {
            Self::StatusChanged { .. } => TemplateKey::StatusChanged,
            Self::ParticipantInvited { .. } => TemplateKey::ParticipantInvited,
            Self::RsvpUpdated { .. } => TemplateKey::RsvpUpdated,
            Self::Reminder { template, .. } => *template,
        }
    }

    /// The routine this event relates to.
    pub fn routine_id(&self) -> RoutineId {
        match self {
            Self::StatusChanged { routine_id, .. }
            | Self::ParticipantInvited { routine_id, .. }
            | Self::RsvpUpdated { routine_id, .. }
            | Self::Reminder { routine_id, .. } => *routine_id,
        }
    }
}

/// One addressed event handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient: Recipient,
    pub event: NotificationEvent,
}

/// Delivery side owned outside the core. Must not block for long; failures
/// are the dispatcher's to retry.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, notification: Notification);
}

/// Dispatcher that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDispatcher;

impl NotificationDispatcher for NoopDispatcher {
    fn dispatch(&self, _notification: Notification) {}
}

#[cfg(test)]
mod tests {
    use super::{parse_template_key, NotificationEvent, TemplateKey, TemplateKeyError};
    use crate::model::routine::RoutineStatus;
    use uuid::Uuid;

    #[test]
    fn template_keys_roundtrip_through_table() {
        for key in [
            TemplateKey::StatusChanged,
            TemplateKey::ParticipantInvited,
            TemplateKey::RsvpUpdated,
            TemplateKey::ReminderUpcoming,
            TemplateKey::ReminderStartingNow,
            TemplateKey::ReminderFollowUp,
        ] {
            assert_eq!(parse_template_key(key.as_str()), Ok(key));
        }
    }

    #[test]
    fn serde_uses_table_ids() {
        let json = serde_json::to_string(&TemplateKey::ReminderUpcoming).unwrap();
        assert_eq!(json, "\"routine.reminder.upcoming\"");
        let parsed: TemplateKey = serde_json::from_str("\"routine.rsvp_updated\"").unwrap();
        assert_eq!(parsed, TemplateKey::RsvpUpdated);
        assert!(serde_json::from_str::<TemplateKey>("\"routine.reminder.daily\"").is_err());
    }

    #[test]
    fn unknown_template_is_rejected() {
        assert_eq!(
            parse_template_key("routine.unknown"),
            Err(TemplateKeyError::Unknown("routine.unknown".to_string()))
        );
    }

    #[test]
    fn status_event_resolves_status_template() {
        let event = NotificationEvent::StatusChanged {
            routine_id: Uuid::nil(),
            from: RoutineStatus::Active,
            to: RoutineStatus::Paused,
        };
        assert_eq!(event.template_key(), TemplateKey::StatusChanged);
        assert!(!event.template_key().is_reminder());
    }
}

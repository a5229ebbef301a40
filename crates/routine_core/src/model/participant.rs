//! Participant model owned by a routine.
//!
//! # Invariants
//! - `(kind, id)` is the identity of a participant inside one routine.
//! - New participants start as `Invited` unless explicitly set otherwise.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Who a participant entry stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantKind {
    /// A single user account.
    User,
    /// A team, answered for by one of its admins.
    TeamRepresentative,
}

impl ParticipantKind {
    /// Stable string id used in storage and log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::TeamRepresentative => "team_representative",
        }
    }
}

/// Invitation / RSVP state of one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Invited,
    Accepted,
    Declined,
    Tentative,
}

impl InvitationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Invited => "invited",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Tentative => "tentative",
        }
    }

    /// Returns whether this status is a valid RSVP answer.
    ///
    /// `Invited` is the initial state and cannot be chosen as a response.
    pub fn is_rsvp_answer(self) -> bool {
        !matches!(self, Self::Invited)
    }
}

/// Identity of one participant inside a routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticipantKey {
    pub kind: ParticipantKind,
    pub id: Uuid,
}

impl ParticipantKey {
    pub fn user(id: Uuid) -> Self {
        Self {
            kind: ParticipantKind::User,
            id,
        }
    }

    pub fn team(id: Uuid) -> Self {
        Self {
            kind: ParticipantKind::TeamRepresentative,
            id,
        }
    }
}

impl Display for ParticipantKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// One invitee/attendee of a routine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Serialized as `type` to match external schema naming.
    #[serde(rename = "type")]
    pub kind: ParticipantKind,
    pub id: Uuid,
    /// Free-form role label, e.g. `organizer` or `speaker`.
    pub role: String,
    pub invitation_status: InvitationStatus,
    /// Optional attendance; still counted against capacity unless declined.
    pub optional: bool,
}

impl Participant {
    /// Creates a required participant in `Invited` state.
    pub fn new(kind: ParticipantKind, id: Uuid, role: impl Into<String>) -> Self {
        Self {
            kind,
            id,
            role: role.into(),
            invitation_status: InvitationStatus::Invited,
            optional: false,
        }
    }

    pub fn key(&self) -> ParticipantKey {
        ParticipantKey {
            kind: self.kind,
            id: self.id,
        }
    }

    /// Returns whether this participant occupies a capacity slot.
    pub fn counts_toward_capacity(&self) -> bool {
        self.invitation_status != InvitationStatus::Declined
    }
}

//! Identity/team provider contract.

use crate::model::participant::{ParticipantKey, ParticipantKind};
use crate::model::routine::{TeamId, UserId};

/// Existence and authorization lookups owned by the identity system.
pub trait IdentityProvider: Send + Sync {
    fn user_exists(&self, user_id: UserId) -> bool;
    fn team_exists(&self, team_id: TeamId) -> bool;
    fn is_team_admin(&self, team_id: TeamId, user_id: UserId) -> bool;
    fn is_team_member(&self, team_id: TeamId, user_id: UserId) -> bool;

    /// Platform-wide administrators may manage any routine.
    fn is_platform_admin(&self, _user_id: UserId) -> bool {
        false
    }

    /// Resolves the identity behind one participant entry.
    fn participant_exists(&self, key: ParticipantKey) -> bool {
        match key.kind {
            ParticipantKind::User => self.user_exists(key.id),
            ParticipantKind::TeamRepresentative => self.team_exists(key.id),
        }
    }
}

//! Participant registry use-case service.
//!
//! # Responsibility
//! - Invite, remove, and answer for participants of one routine.
//!
//! # Invariants
//! - `(kind, id)` is unique inside a routine.
//! - `max_participants` is enforced at add time, counting everyone who has
//!   not declined.
//! - An RSVP identical to the stored status writes nothing and emits nothing.

use crate::collab::notification::NotificationEvent;
use crate::model::participant::{InvitationStatus, Participant, ParticipantKey, ParticipantKind};
use crate::model::routine::{Routine, RoutineId, UserId};
use crate::repo::routine_repo::RoutineRepository;
use crate::service::context::{creator_recipients, ServiceEnv};
use crate::service::routine_service::RoutineServiceError;
use log::info;

/// Participant registry service facade.
pub struct ParticipantService<R: RoutineRepository> {
    repo: R,
    env: ServiceEnv,
}

impl<R: RoutineRepository> ParticipantService<R> {
    /// Creates service from repository implementation and environment.
    pub fn new(repo: R, env: ServiceEnv) -> Self {
        Self { repo, env }
    }

    /// Adds one participant. Requires organizer rights.
    ///
    /// The participant keeps the invitation status it was built with
    /// (`Participant::new` starts as `Invited`).
    pub fn add_participant(
        &self,
        routine_id: RoutineId,
        participant: Participant,
        actor: UserId,
    ) -> Result<Routine, RoutineServiceError> {
        let mut routine = self.load(routine_id)?;
        self.ensure_organizer(&routine, actor)?;

        let key = participant.key();
        if routine.participant(key).is_some() {
            return Err(RoutineServiceError::DuplicateParticipant(key));
        }
        if !self.env.identity.participant_exists(key) {
            return Err(RoutineServiceError::IdentityNotFound(key));
        }
        if let Some(max) = routine.max_participants {
            let counted = routine.counted_participants();
            if participant.counts_toward_capacity() && counted >= max as usize {
                return Err(RoutineServiceError::CapacityExceeded { max, counted });
            }
        }

        let role = participant.role.clone();
        routine.participants.push(participant);
        routine.touch(self.env.now());
        routine.version = self.repo.save_routine(&routine)?;

        info!(
            "event=participant_add module=service status=ok routine_id={} kind={} participants={}",
            routine.id,
            key.kind.as_str(),
            routine.participants.len()
        );
        self.env.notify(
            &[key.into()],
            &NotificationEvent::ParticipantInvited {
                routine_id: routine.id,
                participant: key,
                role,
            },
        );
        Ok(routine)
    }

    /// Removes one participant. Organizers may remove anyone; users may
    /// remove themselves.
    pub fn remove_participant(
        &self,
        routine_id: RoutineId,
        key: ParticipantKey,
        actor: UserId,
    ) -> Result<Routine, RoutineServiceError> {
        let mut routine = self.load(routine_id)?;
        if key != ParticipantKey::user(actor) {
            self.ensure_organizer(&routine, actor)?;
        }

        let before = routine.participants.len();
        routine.participants.retain(|p| p.key() != key);
        if routine.participants.len() == before {
            return Err(RoutineServiceError::ParticipantNotFound {
                routine_id,
                participant: key,
            });
        }

        routine.touch(self.env.now());
        routine.version = self.repo.save_routine(&routine)?;
        info!(
            "event=participant_remove module=service status=ok routine_id={} kind={} participants={}",
            routine.id,
            key.kind.as_str(),
            routine.participants.len()
        );
        Ok(routine)
    }

    /// Records an RSVP answer for one participant.
    ///
    /// Allowed for the participant themself, an admin of a represented team,
    /// and organizers.
    pub fn update_rsvp(
        &self,
        routine_id: RoutineId,
        key: ParticipantKey,
        status: InvitationStatus,
        actor: UserId,
    ) -> Result<Routine, RoutineServiceError> {
        if !status.is_rsvp_answer() {
            return Err(RoutineServiceError::InvalidRsvpStatus(status));
        }

        let mut routine = self.load(routine_id)?;
        let answers_for_self = match key.kind {
            ParticipantKind::User => key.id == actor,
            ParticipantKind::TeamRepresentative => self.env.identity.is_team_admin(key.id, actor),
        };
        if !answers_for_self {
            self.ensure_organizer(&routine, actor)?;
        }

        let Some(participant) = routine.participant_mut(key) else {
            return Err(RoutineServiceError::ParticipantNotFound {
                routine_id,
                participant: key,
            });
        };
        if participant.invitation_status == status {
            return Ok(routine);
        }
        participant.invitation_status = status;

        routine.validate()?;
        routine.touch(self.env.now());
        routine.version = self.repo.save_routine(&routine)?;

        info!(
            "event=participant_rsvp module=service status=ok routine_id={} kind={} rsvp={}",
            routine.id,
            key.kind.as_str(),
            status.as_str()
        );
        self.env.notify(
            &creator_recipients(&routine),
            &NotificationEvent::RsvpUpdated {
                routine_id: routine.id,
                participant: key,
                status,
            },
        );
        Ok(routine)
    }

    /// Lists participants in invitation order.
    pub fn list_participants(
        &self,
        routine_id: RoutineId,
    ) -> Result<Vec<Participant>, RoutineServiceError> {
        Ok(self.load(routine_id)?.participants)
    }

    fn load(&self, routine_id: RoutineId) -> Result<Routine, RoutineServiceError> {
        self.repo
            .get_routine(routine_id)?
            .ok_or(RoutineServiceError::RoutineNotFound(routine_id))
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

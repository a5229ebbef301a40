//! Collaborators and configuration shared by routine services.
//!
//! # Invariants
//! - Services never read a global clock or global settings; both come from
//!   `ServiceEnv`.
//! - Notifications are fire-and-forget and are only dispatched after the
//!   aggregate they describe has been saved.

use crate::collab::clock::{Clock, SystemClock};
use crate::collab::identity::IdentityProvider;
use crate::collab::notification::{
    Notification, NotificationDispatcher, NotificationEvent, Recipient,
};
use crate::config::EngineConfig;
use crate::model::participant::InvitationStatus;
use crate::model::routine::{Owner, Routine, UserId};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// External collaborators plus engine configuration.
#[derive(Clone)]
pub struct ServiceEnv {
    pub identity: Arc<dyn IdentityProvider>,
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub clock: Arc<dyn Clock>,
    pub config: EngineConfig,
}

impl ServiceEnv {
    /// Creates an environment driven by the host clock.
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn NotificationDispatcher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            identity,
            notifier,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Returns whether `actor` may manage `routine`.
    ///
    /// Organizers are the creating user, the owning user, admins of the
    /// owning team, user participants holding the configured organizer role,
    /// and platform admins.
    pub fn is_organizer(&self, routine: &Routine, actor: UserId) -> bool {
        if routine.creator.acted_by == actor {
            return true;
        }
        let owns = match routine.creator.owner {
            Owner::User(owner) => owner == actor,
            Owner::Team(team) => self.identity.is_team_admin(team, actor),
        };
        owns || routine.has_participant_role(actor, &self.config.organizer_role)
            || self.identity.is_platform_admin(actor)
    }

    pub(crate) fn notify(&self, recipients: &[Recipient], event: &NotificationEvent) {
        for recipient in recipients {
            self.notifier.dispatch(Notification {
                recipient: *recipient,
                event: event.clone(),
            });
        }
    }
}

/// Owner of the routine plus the acting user when they differ.
pub(crate) fn creator_recipients(routine: &Routine) -> Vec<Recipient> {
    let mut recipients = vec![Recipient::from(routine.creator.owner)];
    push_unique(&mut recipients, Recipient::User(routine.creator.acted_by));
    recipients
}

/// Creator recipients followed by every participant.
pub(crate) fn all_recipients(routine: &Routine) -> Vec<Recipient> {
    let mut recipients = creator_recipients(routine);
    for participant in &routine.participants {
        push_unique(&mut recipients, Recipient::from(participant.key()));
    }
    recipients
}

/// Creator recipients followed by participants who have not declined.
pub(crate) fn attending_recipients(routine: &Routine) -> Vec<Recipient> {
    let mut recipients = creator_recipients(routine);
    for participant in routine
        .participants
        .iter()
        .filter(|p| p.invitation_status != InvitationStatus::Declined)
    {
        push_unique(&mut recipients, Recipient::from(participant.key()));
    }
    recipients
}

fn push_unique(recipients: &mut Vec<Recipient>, recipient: Recipient) {
    if !recipients.contains(&recipient) {
        recipients.push(recipient);
    }
}

mod common;

use common::{harness, local, title, utc, Harness, StaticIdentity};
use routine_core::model::routine::Owner;
use routine_core::{
    InvitationStatus, NewRoutine, NotificationEvent, Participant, ParticipantKey,
    ParticipantKind, ParticipantService, Recipient, Routine, RoutineService, RoutineServiceError,
    SqliteRoutineRepository,
};
use rusqlite::Connection;
use uuid::Uuid;

struct Fixture {
    conn: Connection,
    h: Harness,
    owner: Uuid,
    alice: Uuid,
    bob: Uuid,
    team: Uuid,
    team_admin: Uuid,
}

impl Fixture {
    fn new() -> Self {
        let owner = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let team = Uuid::new_v4();
        let team_admin = Uuid::new_v4();
        let identity = StaticIdentity::default()
            .with_user(owner)
            .with_user(alice)
            .with_user(bob)
            .with_team_admin(team, team_admin);
        Self {
            conn: routine_core::db::open_db_in_memory().unwrap(),
            h: harness(identity, utc(2025, 4, 1, 0, 0)),
            owner,
            alice,
            bob,
            team,
            team_admin,
        }
    }

    fn participants(&self) -> ParticipantService<SqliteRoutineRepository<'_>> {
        ParticipantService::new(
            SqliteRoutineRepository::try_new(&self.conn).unwrap(),
            self.h.env.clone(),
        )
    }

    fn create(&self, max_participants: Option<u32>) -> Routine {
        let service = RoutineService::new(
            SqliteRoutineRepository::try_new(&self.conn).unwrap(),
            self.h.env.clone(),
        );
        let mut input = NewRoutine::new(
            title("Book club"),
            Owner::User(self.owner),
            local(2025, 4, 10, 19, 0),
            chrono_tz::Europe::Berlin,
        );
        input.max_participants = max_participants;
        let routine = service.create_routine(input, self.owner).unwrap();
        self.h.dispatcher.take();
        routine
    }
}

#[test]
fn add_participant_invites_and_notifies() {
    let f = Fixture::new();
    let routine = f.create(None);

    let updated = f
        .participants()
        .add_participant(
            routine.id,
            Participant::new(ParticipantKind::User, f.alice, "speaker"),
            f.owner,
        )
        .unwrap();

    assert_eq!(updated.version, 2);
    let alice = updated.participant(ParticipantKey::user(f.alice)).unwrap();
    assert_eq!(alice.invitation_status, InvitationStatus::Invited);

    let sent = f.h.dispatcher.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, Recipient::User(f.alice));
    assert_eq!(
        sent[0].event,
        NotificationEvent::ParticipantInvited {
            routine_id: routine.id,
            participant: ParticipantKey::user(f.alice),
            role: "speaker".to_string(),
        }
    );
}

#[test]
fn duplicate_and_unknown_participants_are_rejected() {
    let f = Fixture::new();
    let routine = f.create(None);
    let service = f.participants();
    service
        .add_participant(
            routine.id,
            Participant::new(ParticipantKind::User, f.alice, "member"),
            f.owner,
        )
        .unwrap();

    assert!(matches!(
        service.add_participant(
            routine.id,
            Participant::new(ParticipantKind::User, f.alice, "guest"),
            f.owner,
        ),
        Err(RoutineServiceError::DuplicateParticipant(key)) if key == ParticipantKey::user(f.alice)
    ));
    assert!(matches!(
        service.add_participant(
            routine.id,
            Participant::new(ParticipantKind::TeamRepresentative, Uuid::new_v4(), "member"),
            f.owner,
        ),
        Err(RoutineServiceError::IdentityNotFound(_))
    ));
}

#[test]
fn capacity_counts_everyone_who_has_not_declined() {
    let f = Fixture::new();
    let routine = f.create(Some(1));
    let service = f.participants();
    service
        .add_participant(
            routine.id,
            Participant::new(ParticipantKind::User, f.alice, "member"),
            f.owner,
        )
        .unwrap();

    let err = service
        .add_participant(
            routine.id,
            Participant::new(ParticipantKind::User, f.bob, "member"),
            f.owner,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        RoutineServiceError::CapacityExceeded { max: 1, counted: 1 }
    ));

    service
        .update_rsvp(
            routine.id,
            ParticipantKey::user(f.alice),
            InvitationStatus::Declined,
            f.alice,
        )
        .unwrap();
    let updated = service
        .add_participant(
            routine.id,
            Participant::new(ParticipantKind::User, f.bob, "member"),
            f.owner,
        )
        .unwrap();
    assert_eq!(updated.participants.len(), 2);
    assert_eq!(updated.counted_participants(), 1);
}

#[test]
fn non_organizer_cannot_add_participants() {
    let f = Fixture::new();
    let routine = f.create(None);
    assert!(matches!(
        f.participants().add_participant(
            routine.id,
            Participant::new(ParticipantKind::User, f.bob, "member"),
            f.alice,
        ),
        Err(RoutineServiceError::Unauthorized { .. })
    ));
}

#[test]
fn rsvp_is_authorized_per_participant_and_idempotent() {
    let f = Fixture::new();
    let routine = f.create(None);
    let service = f.participants();
    for participant in [
        Participant::new(ParticipantKind::User, f.alice, "member"),
        Participant::new(ParticipantKind::TeamRepresentative, f.team, "member"),
    ] {
        service
            .add_participant(routine.id, participant, f.owner)
            .unwrap();
    }
    f.h.dispatcher.take();

    let alice = ParticipantKey::user(f.alice);
    assert!(matches!(
        service.update_rsvp(routine.id, alice, InvitationStatus::Accepted, f.bob),
        Err(RoutineServiceError::Unauthorized { .. })
    ));

    let accepted = service
        .update_rsvp(routine.id, alice, InvitationStatus::Accepted, f.alice)
        .unwrap();
    let version = accepted.version;
    assert_eq!(
        f.h.dispatcher.events(),
        vec![NotificationEvent::RsvpUpdated {
            routine_id: routine.id,
            participant: alice,
            status: InvitationStatus::Accepted,
        }]
    );

    let repeated = service
        .update_rsvp(routine.id, alice, InvitationStatus::Accepted, f.alice)
        .unwrap();
    assert_eq!(repeated.version, version);
    assert!(f.h.dispatcher.take().is_empty());

    let team = ParticipantKey::team(f.team);
    let tentative = service
        .update_rsvp(routine.id, team, InvitationStatus::Tentative, f.team_admin)
        .unwrap();
    assert_eq!(
        tentative.participant(team).unwrap().invitation_status,
        InvitationStatus::Tentative
    );

    let by_organizer = service
        .update_rsvp(routine.id, alice, InvitationStatus::Declined, f.owner)
        .unwrap();
    assert_eq!(
        by_organizer.participant(alice).unwrap().invitation_status,
        InvitationStatus::Declined
    );
}

#[test]
fn invited_is_not_an_rsvp_answer() {
    let f = Fixture::new();
    let routine = f.create(None);
    let service = f.participants();
    service
        .add_participant(
            routine.id,
            Participant::new(ParticipantKind::User, f.alice, "member"),
            f.owner,
        )
        .unwrap();
    assert!(matches!(
        service.update_rsvp(
            routine.id,
            ParticipantKey::user(f.alice),
            InvitationStatus::Invited,
            f.alice
        ),
        Err(RoutineServiceError::InvalidRsvpStatus(InvitationStatus::Invited))
    ));
}

#[test]
fn remove_participant_by_organizer_or_self() {
    let f = Fixture::new();
    let routine = f.create(None);
    let service = f.participants();
    for user in [f.alice, f.bob] {
        service
            .add_participant(
                routine.id,
                Participant::new(ParticipantKind::User, user, "member"),
                f.owner,
            )
            .unwrap();
    }

    assert!(matches!(
        service.remove_participant(routine.id, ParticipantKey::user(f.bob), f.alice),
        Err(RoutineServiceError::Unauthorized { .. })
    ));
    service
        .remove_participant(routine.id, ParticipantKey::user(f.alice), f.alice)
        .unwrap();
    service
        .remove_participant(routine.id, ParticipantKey::user(f.bob), f.owner)
        .unwrap();
    assert!(service.list_participants(routine.id).unwrap().is_empty());

    assert!(matches!(
        service.remove_participant(routine.id, ParticipantKey::user(f.bob), f.owner),
        Err(RoutineServiceError::ParticipantNotFound { .. })
    ));
}

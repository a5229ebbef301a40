mod common;

use chrono::TimeDelta;
use common::{local, title, utc};
use routine_core::db::open_db_in_memory;
use routine_core::model::routine::{Location, RoutineTask};
use routine_core::repo::routine_repo::PageWindow;
use routine_core::{
    parse_rule, Creator, InvitationStatus, Participant, ParticipantKey, ParticipantKind,
    ReminderRule, RepoError, Routine, RoutineRepository, RoutineStatus, SqliteRoutineRepository,
    TemplateKey,
};
use uuid::Uuid;

fn sample_routine() -> Routine {
    let mut routine = Routine::new(
        title("Team sync"),
        Creator::user(Uuid::new_v4()),
        local(2025, 1, 6, 9, 0),
        chrono_tz::Asia::Tehran,
        utc(2025, 1, 1, 8, 0),
    )
    .with_recurrence(parse_rule("FREQ=WEEKLY;BYDAY=MO,WE").unwrap());
    routine.next_occurrence = Some(utc(2025, 1, 6, 5, 30));
    routine
}

#[test]
fn create_and_get_roundtrip_full_aggregate() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRoutineRepository::try_new(&conn).unwrap();

    let mut routine = sample_routine();
    routine.title.insert("fa".to_string(), "همگام‌سازی".to_string());
    routine.description_ref = Some("content://desc/42".to_string());
    routine.end = Some(local(2025, 6, 30, 18, 0));
    routine.purpose = Some("planning".to_string());
    routine.location = Some(Location::Online {
        platform: "meet".to_string(),
        url: Some("https://meet.example/abc".to_string()),
    });
    routine.max_participants = Some(5);
    routine.rsvp_required = true;
    routine.tasks.push(RoutineTask::new("Prepare agenda"));
    routine.linked_team = Some(Uuid::new_v4());
    routine
        .reminder_rules
        .push(ReminderRule::new(TimeDelta::hours(-1), TemplateKey::ReminderUpcoming));
    let mut guest = Participant::new(ParticipantKind::User, Uuid::new_v4(), "speaker");
    guest.optional = true;
    guest.invitation_status = InvitationStatus::Tentative;
    routine.participants.push(guest);
    routine
        .participants
        .push(Participant::new(ParticipantKind::TeamRepresentative, Uuid::new_v4(), "member"));

    repo.create_routine(&routine).unwrap();
    let loaded = repo.get_routine(routine.id).unwrap().unwrap();

    assert_eq!(loaded, routine);
}

#[test]
fn get_missing_routine_returns_none() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRoutineRepository::try_new(&conn).unwrap();
    assert!(repo.get_routine(Uuid::new_v4()).unwrap().is_none());
}

#[test]
fn save_bumps_version_and_rewrites_participants() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRoutineRepository::try_new(&conn).unwrap();
    let mut routine = sample_routine();
    let first = Participant::new(ParticipantKind::User, Uuid::new_v4(), "member");
    routine.participants.push(first.clone());
    repo.create_routine(&routine).unwrap();

    routine.participants.clear();
    let second = Participant::new(ParticipantKind::User, Uuid::new_v4(), "member");
    routine.participants.push(second.clone());
    routine.status = RoutineStatus::Paused;

    let version = repo.save_routine(&routine).unwrap();
    assert_eq!(version, 2);

    let loaded = repo.get_routine(routine.id).unwrap().unwrap();
    assert_eq!(loaded.version, 2);
    assert_eq!(loaded.status, RoutineStatus::Paused);
    assert_eq!(loaded.participants, vec![second]);
    assert!(loaded.participant(first.key()).is_none());
}

#[test]
fn stale_save_is_rejected_without_writing() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRoutineRepository::try_new(&conn).unwrap();
    let routine = sample_routine();
    repo.create_routine(&routine).unwrap();

    let mut writer_a = repo.get_routine(routine.id).unwrap().unwrap();
    let mut writer_b = writer_a.clone();

    writer_a.status = RoutineStatus::Paused;
    writer_a.version = repo.save_routine(&writer_a).unwrap();

    writer_b.status = RoutineStatus::Cancelled;
    writer_b.next_occurrence = None;
    let err = repo.save_routine(&writer_b).unwrap_err();
    assert!(matches!(
        err,
        RepoError::VersionConflict { id, expected: 1 } if id == routine.id
    ));

    let stored = repo.get_routine(routine.id).unwrap().unwrap();
    assert_eq!(stored.status, RoutineStatus::Paused);
    assert_eq!(stored.version, 2);
}

#[test]
fn saving_unknown_routine_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRoutineRepository::try_new(&conn).unwrap();
    let routine = sample_routine();
    assert!(matches!(
        repo.save_routine(&routine),
        Err(RepoError::NotFound(id)) if id == routine.id
    ));
}

#[test]
fn invalid_aggregate_is_rejected_before_sql() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRoutineRepository::try_new(&conn).unwrap();
    let mut routine = sample_routine();
    routine.recurrence_rule = None;
    assert!(matches!(
        repo.create_routine(&routine),
        Err(RepoError::Validation(_))
    ));
    assert!(repo.get_routine(routine.id).unwrap().is_none());
}

#[test]
fn corrupted_timezone_is_reported_as_invalid_data() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRoutineRepository::try_new(&conn).unwrap();
    let routine = sample_routine();
    repo.create_routine(&routine).unwrap();

    conn.execute(
        "UPDATE routines SET timezone = 'Mars/Olympus' WHERE uuid = ?1;",
        [routine.id.to_string()],
    )
    .unwrap();

    let err = repo.get_routine(routine.id).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(message) if message.contains("timezone")));
}

#[test]
fn find_for_participant_orders_by_next_occurrence_with_empty_last() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRoutineRepository::try_new(&conn).unwrap();
    let member = ParticipantKey::user(Uuid::new_v4());

    let mut ids = Vec::new();
    for next in [Some(utc(2025, 2, 3, 9, 0)), None, Some(utc(2025, 1, 20, 9, 0))] {
        let mut routine = sample_routine();
        routine.next_occurrence = next;
        routine
            .participants
            .push(Participant::new(member.kind, member.id, "member"));
        repo.create_routine(&routine).unwrap();
        ids.push(routine.id);
    }
    repo.create_routine(&sample_routine()).unwrap();

    let page = repo
        .find_for_participant(
            member,
            PageWindow {
                page: 1,
                page_size: 10,
            },
        )
        .unwrap();
    assert_eq!(page.total_items, 3);
    let order = page.items.iter().map(|r| r.id).collect::<Vec<_>>();
    assert_eq!(order, vec![ids[2], ids[0], ids[1]]);
}

#[test]
fn list_ids_by_status_filters_status() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRoutineRepository::try_new(&conn).unwrap();
    let active = sample_routine();
    let mut paused = sample_routine();
    paused.status = RoutineStatus::Paused;
    repo.create_routine(&active).unwrap();
    repo.create_routine(&paused).unwrap();

    assert_eq!(
        repo.list_ids_by_status(RoutineStatus::Active).unwrap(),
        vec![active.id]
    );
    assert_eq!(
        repo.list_ids_by_status(RoutineStatus::Paused).unwrap(),
        vec![paused.id]
    );
}

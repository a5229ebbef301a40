//! Routine repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Load and save whole routine aggregates, participants included.
//! - Serve range queries by `(next_occurrence, status)` and by participant.
//!
//! # Invariants
//! - Write paths call `Routine::validate()` before SQL mutations.
//! - `save_routine` is a compare-and-swap on `version`; a stale aggregate is
//!   rejected with `VersionConflict` and nothing is written.
//! - Listing filters (range, status, visibility) and pagination run in the
//!   same statement, and totals are counted with the identical filter.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::participant::{InvitationStatus, Participant, ParticipantKey, ParticipantKind};
use crate::model::routine::{
    Creator, Owner, Routine, RoutineId, RoutineStatus, RoutineValidationError, ScheduleType,
    UserId, Visibility,
};
use crate::recurrence::parse_rule;
use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const ROUTINE_COLUMNS: &str = "
    r.uuid,
    r.title_json,
    r.description_ref,
    r.owner_kind,
    r.owner_id,
    r.acted_by,
    r.status,
    r.visibility,
    r.schedule_type,
    r.start_local,
    r.end_local,
    r.recurrence_rule,
    r.duration_minutes,
    r.timezone,
    r.next_occurrence,
    r.purpose,
    r.location_json,
    r.max_participants,
    r.rsvp_required,
    r.tasks_json,
    r.linked_project,
    r.linked_team,
    r.reminders_json,
    r.version,
    r.created_at,
    r.updated_at";

const LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for routine persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(RoutineValidationError),
    Db(DbError),
    NotFound(RoutineId),
    /// The stored aggregate moved past the version the caller loaded.
    VersionConflict {
        id: RoutineId,
        expected: i64,
    },
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "routine not found: {id}"),
            Self::VersionConflict { id, expected } => write!(
                f,
                "routine {id} was modified concurrently; expected version {expected}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted routine data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "routine repository requires schema version {expected_version}, got {actual_version}"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RoutineValidationError> for RepoError {
    fn from(value: RoutineValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Which routines a listing caller may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityScope {
    /// Only `Visibility::Public` routines.
    PublicOnly,
    /// Public routines, routines the user created or acted for, and
    /// `Participants` routines the user attends as a user participant.
    Viewer(UserId),
    /// Everything; administrative listings.
    Unrestricted,
}

/// Caller-facing pagination input. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    /// `None` takes the configured default.
    pub page_size: Option<u32>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: None,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size: Some(page_size),
        }
    }
}

/// Normalized page window handed to the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u32,
    pub page_size: u32,
}

impl PageWindow {
    fn offset(self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.page_size)
    }
}

/// One page of results plus accounting for the whole filtered set.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    fn new(items: Vec<T>, window: PageWindow, total_items: u64) -> Self {
        let page_size = u64::from(window.page_size.max(1));
        Self {
            items,
            page: window.page,
            page_size: window.page_size,
            total_items,
            total_pages: total_items.div_ceil(page_size),
        }
    }
}

/// Range query for routines whose next occurrence falls in `[from, to)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpcomingQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    /// Defaults to `Active`; paused and archived routines stay out of
    /// upcoming listings unless asked for explicitly.
    pub status: RoutineStatus,
    pub scope: VisibilityScope,
    pub page: PageRequest,
}

impl UpcomingQuery {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>, scope: VisibilityScope) -> Self {
        Self {
            from,
            to,
            status: RoutineStatus::Active,
            scope,
            page: PageRequest::default(),
        }
    }
}

/// Repository interface for routine aggregates.
pub trait RoutineRepository {
    /// Inserts a new aggregate at its current `version`.
    fn create_routine(&self, routine: &Routine) -> RepoResult<RoutineId>;
    fn get_routine(&self, id: RoutineId) -> RepoResult<Option<Routine>>;
    /// Saves `routine` if the stored version equals `routine.version`.
    /// Returns the new version.
    fn save_routine(&self, routine: &Routine) -> RepoResult<i64>;
    fn find_upcoming(&self, query: &UpcomingQuery, window: PageWindow)
        -> RepoResult<Page<Routine>>;
    fn find_for_participant(
        &self,
        key: ParticipantKey,
        window: PageWindow,
    ) -> RepoResult<Page<Routine>>;
    fn list_ids_by_status(&self, status: RoutineStatus) -> RepoResult<Vec<RoutineId>>;
}

/// SQLite-backed routine repository.
pub struct SqliteRoutineRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRoutineRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let expected_version = latest_version();
        let actual_version: u32 =
            conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self { conn })
    }
}

impl RoutineRepository for SqliteRoutineRepository<'_> {
    fn create_routine(&self, routine: &Routine) -> RepoResult<RoutineId> {
        routine.validate()?;
        let row = EncodedRoutine::encode(routine)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO routines (
                uuid,
                title_json,
                description_ref,
                owner_kind,
                owner_id,
                acted_by,
                status,
                visibility,
                schedule_type,
                start_local,
                end_local,
                recurrence_rule,
                duration_minutes,
                timezone,
                next_occurrence,
                purpose,
                location_json,
                max_participants,
                rsvp_required,
                tasks_json,
                linked_project,
                linked_team,
                reminders_json,
                created_at,
                updated_at,
                version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                      ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26);",
            params![
                row.uuid,
                row.title_json,
                row.description_ref,
                row.owner_kind,
                row.owner_id,
                row.acted_by,
                row.status,
                row.visibility,
                row.schedule_type,
                row.start_local,
                row.end_local,
                row.recurrence_rule,
                row.duration_minutes,
                row.timezone,
                row.next_occurrence,
                row.purpose,
                row.location_json,
                row.max_participants,
                row.rsvp_required,
                row.tasks_json,
                row.linked_project,
                row.linked_team,
                row.reminders_json,
                row.created_at,
                row.updated_at,
                routine.version,
            ],
        )?;
        replace_participants(&tx, routine)?;
        tx.commit()?;

        Ok(routine.id)
    }

    fn get_routine(&self, id: RoutineId) -> RepoResult<Option<Routine>> {
        load_routine(self.conn, id)
    }

    fn save_routine(&self, routine: &Routine) -> RepoResult<i64> {
        routine.validate()?;
        let row = EncodedRoutine::encode(routine)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE routines
             SET
                title_json = ?1,
                description_ref = ?2,
                owner_kind = ?3,
                owner_id = ?4,
                acted_by = ?5,
                status = ?6,
                visibility = ?7,
                schedule_type = ?8,
                start_local = ?9,
                end_local = ?10,
                recurrence_rule = ?11,
                duration_minutes = ?12,
                timezone = ?13,
                next_occurrence = ?14,
                purpose = ?15,
                location_json = ?16,
                max_participants = ?17,
                rsvp_required = ?18,
                tasks_json = ?19,
                linked_project = ?20,
                linked_team = ?21,
                reminders_json = ?22,
                updated_at = ?23,
                version = version + 1
             WHERE uuid = ?24 AND version = ?25;",
            params![
                row.title_json,
                row.description_ref,
                row.owner_kind,
                row.owner_id,
                row.acted_by,
                row.status,
                row.visibility,
                row.schedule_type,
                row.start_local,
                row.end_local,
                row.recurrence_rule,
                row.duration_minutes,
                row.timezone,
                row.next_occurrence,
                row.purpose,
                row.location_json,
                row.max_participants,
                row.rsvp_required,
                row.tasks_json,
                row.linked_project,
                row.linked_team,
                row.reminders_json,
                row.updated_at,
                row.uuid,
                routine.version,
            ],
        )?;

        if changed == 0 {
            let exists: i64 = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM routines WHERE uuid = ?1);",
                [routine.id.to_string()],
                |row| row.get(0),
            )?;
            return Err(if exists == 1 {
                RepoError::VersionConflict {
                    id: routine.id,
                    expected: routine.version,
                }
            } else {
                RepoError::NotFound(routine.id)
            });
        }

        replace_participants(&tx, routine)?;
        tx.commit()?;
        Ok(routine.version + 1)
    }

    fn find_upcoming(
        &self,
        query: &UpcomingQuery,
        window: PageWindow,
    ) -> RepoResult<Page<Routine>> {
        let mut filter = String::from(
            " WHERE r.status = ?
               AND r.next_occurrence IS NOT NULL
               AND r.next_occurrence >= ?
               AND r.next_occurrence < ?",
        );
        let mut binds = vec![
            Value::Text(query.status.as_str().to_string()),
            Value::Integer(query.from.timestamp_millis()),
            Value::Integer(query.to.timestamp_millis()),
        ];

        match query.scope {
            VisibilityScope::PublicOnly => filter.push_str(" AND r.visibility = 'public'"),
            VisibilityScope::Viewer(user_id) => {
                filter.push_str(
                    " AND (
                        r.visibility = 'public'
                        OR (r.owner_kind = 'user' AND r.owner_id = ?)
                        OR r.acted_by = ?
                        OR (
                            r.visibility = 'participants'
                            AND EXISTS (
                                SELECT 1 FROM routine_participants p
                                WHERE p.routine_uuid = r.uuid
                                  AND p.participant_kind = 'user'
                                  AND p.participant_id = ?
                            )
                        )
                    )",
                );
                let viewer = user_id.to_string();
                binds.extend(std::iter::repeat(Value::Text(viewer)).take(3));
            }
            VisibilityScope::Unrestricted => {}
        }

        query_page(
            self.conn,
            &filter,
            binds,
            "ORDER BY r.next_occurrence ASC, r.uuid ASC",
            window,
        )
    }

    fn find_for_participant(
        &self,
        key: ParticipantKey,
        window: PageWindow,
    ) -> RepoResult<Page<Routine>> {
        let filter = " WHERE EXISTS (
                SELECT 1 FROM routine_participants p
                WHERE p.routine_uuid = r.uuid
                  AND p.participant_kind = ?
                  AND p.participant_id = ?
            )";
        let binds = vec![
            Value::Text(key.kind.as_str().to_string()),
            Value::Text(key.id.to_string()),
        ];
        query_page(
            self.conn,
            filter,
            binds,
            "ORDER BY r.next_occurrence IS NULL, r.next_occurrence ASC, r.uuid ASC",
            window,
        )
    }

    fn list_ids_by_status(&self, status: RoutineStatus) -> RepoResult<Vec<RoutineId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uuid FROM routines WHERE status = ?1 ORDER BY uuid ASC;")?;
        let mut rows = stmt.query([status.as_str()])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            ids.push(parse_uuid(&value, "routines.uuid")?);
        }
        Ok(ids)
    }
}

/// Column values of one `routines` row, encoded for SQLite.
struct EncodedRoutine {
    uuid: String,
    title_json: String,
    description_ref: Option<String>,
    owner_kind: &'static str,
    owner_id: String,
    acted_by: String,
    status: &'static str,
    visibility: &'static str,
    schedule_type: &'static str,
    start_local: String,
    end_local: Option<String>,
    recurrence_rule: Option<String>,
    duration_minutes: i64,
    timezone: &'static str,
    next_occurrence: Option<i64>,
    purpose: Option<String>,
    location_json: Option<String>,
    max_participants: Option<i64>,
    rsvp_required: i64,
    tasks_json: String,
    linked_project: Option<String>,
    linked_team: Option<String>,
    reminders_json: String,
    created_at: i64,
    updated_at: i64,
}

impl EncodedRoutine {
    fn encode(routine: &Routine) -> RepoResult<Self> {
        let (owner_kind, owner_id) = match routine.creator.owner {
            Owner::User(id) => ("user", id),
            Owner::Team(id) => ("team", id),
        };
        Ok(Self {
            uuid: routine.id.to_string(),
            title_json: to_json(&routine.title, "title_json")?,
            description_ref: routine.description_ref.clone(),
            owner_kind,
            owner_id: owner_id.to_string(),
            acted_by: routine.creator.acted_by.to_string(),
            status: routine.status.as_str(),
            visibility: visibility_to_db(routine.visibility),
            schedule_type: schedule_type_to_db(routine.schedule_type),
            start_local: routine.start.format(LOCAL_FORMAT).to_string(),
            end_local: routine
                .end
                .map(|end| end.format(LOCAL_FORMAT).to_string()),
            recurrence_rule: routine.recurrence_rule.as_ref().map(ToString::to_string),
            duration_minutes: i64::from(routine.duration_minutes),
            timezone: routine.timezone.name(),
            next_occurrence: routine.next_occurrence.map(|at| at.timestamp_millis()),
            purpose: routine.purpose.clone(),
            location_json: routine
                .location
                .as_ref()
                .map(|location| to_json(location, "location_json"))
                .transpose()?,
            max_participants: routine.max_participants.map(i64::from),
            rsvp_required: bool_to_int(routine.rsvp_required),
            tasks_json: to_json(&routine.tasks, "tasks_json")?,
            linked_project: routine.linked_project.map(|id| id.to_string()),
            linked_team: routine.linked_team.map(|id| id.to_string()),
            reminders_json: to_json(&routine.reminder_rules, "reminders_json")?,
            created_at: routine.created_at.timestamp_millis(),
            updated_at: routine.updated_at.timestamp_millis(),
        })
    }
}

fn query_page(
    conn: &Connection,
    filter: &str,
    mut binds: Vec<Value>,
    order_by: &str,
    window: PageWindow,
) -> RepoResult<Page<Routine>> {
    // One read transaction so the count and the page see the same snapshot.
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Deferred)?;

    let total: i64 = tx.query_row(
        &format!("SELECT COUNT(*) FROM routines r{filter};"),
        params_from_iter(binds.iter()),
        |row| row.get(0),
    )?;

    binds.push(Value::Integer(i64::from(window.page_size)));
    binds.push(Value::Integer(window.offset()));
    let mut stmt = tx.prepare(&format!(
        "SELECT {ROUTINE_COLUMNS} FROM routines r{filter} {order_by} LIMIT ? OFFSET ?;"
    ))?;
    let mut rows = stmt.query(params_from_iter(binds.iter()))?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(parse_routine_row(row)?);
    }
    drop(rows);
    drop(stmt);

    for routine in &mut items {
        routine.participants = load_participants(&tx, routine.id)?;
        routine.validate()?;
    }
    tx.commit()?;

    let total = u64::try_from(total).unwrap_or(0);
    Ok(Page::new(items, window, total))
}

fn load_routine(conn: &Connection, id: RoutineId) -> RepoResult<Option<Routine>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ROUTINE_COLUMNS} FROM routines r WHERE r.uuid = ?1;"
    ))?;
    let mut rows = stmt.query([id.to_string()])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let mut routine = parse_routine_row(row)?;
    routine.participants = load_participants(conn, id)?;
    routine.validate()?;
    Ok(Some(routine))
}

fn load_participants(conn: &Connection, id: RoutineId) -> RepoResult<Vec<Participant>> {
    let mut stmt = conn.prepare(
        "SELECT participant_kind, participant_id, role, invitation_status, is_optional
         FROM routine_participants
         WHERE routine_uuid = ?1
         ORDER BY position ASC;",
    )?;
    let mut rows = stmt.query([id.to_string()])?;
    let mut participants = Vec::new();
    while let Some(row) = rows.next()? {
        let kind_text: String = row.get("participant_kind")?;
        let kind = parse_participant_kind(&kind_text).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid participant kind `{kind_text}` in routine_participants.participant_kind"
            ))
        })?;
        let id_text: String = row.get("participant_id")?;
        let status_text: String = row.get("invitation_status")?;
        let invitation_status = parse_invitation_status(&status_text).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid invitation status `{status_text}` in routine_participants.invitation_status"
            ))
        })?;
        participants.push(Participant {
            kind,
            id: parse_uuid(&id_text, "routine_participants.participant_id")?,
            role: row.get("role")?,
            invitation_status,
            optional: int_to_bool(row.get("is_optional")?, "routine_participants.is_optional")?,
        });
    }
    Ok(participants)
}

fn replace_participants(conn: &Connection, routine: &Routine) -> RepoResult<()> {
    let routine_uuid = routine.id.to_string();
    conn.execute(
        "DELETE FROM routine_participants WHERE routine_uuid = ?1;",
        [&routine_uuid],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO routine_participants (
            routine_uuid,
            position,
            participant_kind,
            participant_id,
            role,
            invitation_status,
            is_optional
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
    )?;
    for (position, participant) in routine.participants.iter().enumerate() {
        stmt.execute(params![
            routine_uuid,
            i64::try_from(position).unwrap_or(i64::MAX),
            participant.kind.as_str(),
            participant.id.to_string(),
            participant.role.as_str(),
            participant.invitation_status.as_str(),
            bool_to_int(participant.optional),
        ])?;
    }
    Ok(())
}

fn parse_routine_row(row: &Row<'_>) -> RepoResult<Routine> {
    let uuid_text: String = row.get("uuid")?;
    let id = parse_uuid(&uuid_text, "routines.uuid")?;

    let owner_kind: String = row.get("owner_kind")?;
    let owner_id_text: String = row.get("owner_id")?;
    let owner_id = parse_uuid(&owner_id_text, "routines.owner_id")?;
    let owner = match owner_kind.as_str() {
        "user" => Owner::User(owner_id),
        "team" => Owner::Team(owner_id),
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid owner kind `{other}` in routines.owner_kind"
            )));
        }
    };
    let acted_by_text: String = row.get("acted_by")?;

    let status_text: String = row.get("status")?;
    let status = parse_status(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid status `{status_text}` in routines.status"))
    })?;
    let visibility_text: String = row.get("visibility")?;
    let visibility = parse_visibility(&visibility_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid visibility `{visibility_text}` in routines.visibility"
        ))
    })?;
    let schedule_text: String = row.get("schedule_type")?;
    let schedule_type = parse_schedule_type(&schedule_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid schedule type `{schedule_text}` in routines.schedule_type"
        ))
    })?;

    let start_text: String = row.get("start_local")?;
    let end_text: Option<String> = row.get("end_local")?;
    let rule_text: Option<String> = row.get("recurrence_rule")?;
    let recurrence_rule = rule_text
        .map(|text| {
            parse_rule(&text).map_err(|err| {
                RepoError::InvalidData(format!(
                    "invalid rule `{text}` in routines.recurrence_rule: {err}"
                ))
            })
        })
        .transpose()?;

    let timezone_text: String = row.get("timezone")?;
    let timezone = timezone_text.parse::<Tz>().map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid timezone `{timezone_text}` in routines.timezone"
        ))
    })?;

    let duration: i64 = row.get("duration_minutes")?;
    let duration_minutes = u32::try_from(duration).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid duration `{duration}` in routines.duration_minutes"
        ))
    })?;
    let max_participants = row
        .get::<_, Option<i64>>("max_participants")?
        .map(|value| {
            u32::try_from(value).map_err(|_| {
                RepoError::InvalidData(format!(
                    "invalid max_participants `{value}` in routines.max_participants"
                ))
            })
        })
        .transpose()?;

    let location_json: Option<String> = row.get("location_json")?;
    let linked_project: Option<String> = row.get("linked_project")?;
    let linked_team: Option<String> = row.get("linked_team")?;

    Ok(Routine {
        id,
        title: from_json(&row.get::<_, String>("title_json")?, "routines.title_json")?,
        description_ref: row.get("description_ref")?,
        creator: Creator {
            owner,
            acted_by: parse_uuid(&acted_by_text, "routines.acted_by")?,
        },
        status,
        visibility,
        schedule_type,
        start: parse_local(&start_text, "routines.start_local")?,
        end: end_text
            .map(|text| parse_local(&text, "routines.end_local"))
            .transpose()?,
        recurrence_rule,
        duration_minutes,
        timezone,
        next_occurrence: row
            .get::<_, Option<i64>>("next_occurrence")?
            .map(|ms| parse_epoch_ms(ms, "routines.next_occurrence"))
            .transpose()?,
        purpose: row.get("purpose")?,
        location: location_json
            .map(|text| from_json(&text, "routines.location_json"))
            .transpose()?,
        participants: Vec::new(),
        max_participants,
        rsvp_required: int_to_bool(row.get("rsvp_required")?, "routines.rsvp_required")?,
        tasks: from_json(&row.get::<_, String>("tasks_json")?, "routines.tasks_json")?,
        linked_project: linked_project
            .map(|text| parse_uuid(&text, "routines.linked_project"))
            .transpose()?,
        linked_team: linked_team
            .map(|text| parse_uuid(&text, "routines.linked_team"))
            .transpose()?,
        reminder_rules: from_json(
            &row.get::<_, String>("reminders_json")?,
            "routines.reminders_json",
        )?,
        version: row.get("version")?,
        created_at: parse_epoch_ms(row.get("created_at")?, "routines.created_at")?,
        updated_at: parse_epoch_ms(row.get("updated_at")?, "routines.updated_at")?,
    })
}

fn to_json<T: Serialize + ?Sized>(value: &T, column: &'static str) -> RepoResult<String> {
    serde_json::to_string(value)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode {column}: {err}")))
}

fn from_json<T: DeserializeOwned>(value: &str, column: &'static str) -> RepoResult<T> {
    serde_json::from_str(value)
        .map_err(|err| RepoError::InvalidData(format!("invalid json in {column}: {err}")))
}

fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn parse_local(value: &str, column: &'static str) -> RepoResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, LOCAL_FORMAT).map_err(|_| {
        RepoError::InvalidData(format!("invalid local datetime `{value}` in {column}"))
    })
}

fn parse_epoch_ms(value: i64, column: &'static str) -> RepoResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid epoch ms `{value}` in {column}")))
}

fn parse_status(value: &str) -> Option<RoutineStatus> {
    match value {
        "active" => Some(RoutineStatus::Active),
        "paused" => Some(RoutineStatus::Paused),
        "completed" => Some(RoutineStatus::Completed),
        "archived" => Some(RoutineStatus::Archived),
        "cancelled" => Some(RoutineStatus::Cancelled),
        _ => None,
    }
}

fn visibility_to_db(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Public => "public",
        Visibility::Participants => "participants",
        Visibility::Private => "private",
    }
}

fn parse_visibility(value: &str) -> Option<Visibility> {
    match value {
        "public" => Some(Visibility::Public),
        "participants" => Some(Visibility::Participants),
        "private" => Some(Visibility::Private),
        _ => None,
    }
}

fn schedule_type_to_db(schedule_type: ScheduleType) -> &'static str {
    match schedule_type {
        ScheduleType::Recurring => "recurring",
        ScheduleType::SingleOccurrence => "single_occurrence",
    }
}

fn parse_schedule_type(value: &str) -> Option<ScheduleType> {
    match value {
        "recurring" => Some(ScheduleType::Recurring),
        "single_occurrence" => Some(ScheduleType::SingleOccurrence),
        _ => None,
    }
}

fn parse_participant_kind(value: &str) -> Option<ParticipantKind> {
    match value {
        "user" => Some(ParticipantKind::User),
        "team_representative" => Some(ParticipantKind::TeamRepresentative),
        _ => None,
    }
}

fn parse_invitation_status(value: &str) -> Option<InvitationStatus> {
    match value {
        "invited" => Some(InvitationStatus::Invited),
        "accepted" => Some(InvitationStatus::Accepted),
        "declined" => Some(InvitationStatus::Declined),
        "tentative" => Some(InvitationStatus::Tentative),
        _ => None,
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn int_to_bool(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean `{other}` in {column}"
        ))),
    }
}

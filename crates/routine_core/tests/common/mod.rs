#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use routine_core::model::routine::{LocalizedText, TeamId, UserId};
use routine_core::{
    EngineConfig, FixedClock, IdentityProvider, Notification, NotificationDispatcher,
    NotificationEvent, ServiceEnv,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Identity provider backed by in-memory sets.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    users: HashSet<UserId>,
    teams: HashSet<TeamId>,
    admins: HashSet<(TeamId, UserId)>,
    members: HashSet<(TeamId, UserId)>,
    platform_admins: HashSet<UserId>,
}

impl StaticIdentity {
    pub fn with_user(mut self, user: UserId) -> Self {
        self.users.insert(user);
        self
    }

    pub fn with_team(mut self, team: TeamId) -> Self {
        self.teams.insert(team);
        self
    }

    pub fn with_team_admin(mut self, team: TeamId, user: UserId) -> Self {
        self.users.insert(user);
        self.teams.insert(team);
        self.admins.insert((team, user));
        self.members.insert((team, user));
        self
    }

    pub fn with_team_member(mut self, team: TeamId, user: UserId) -> Self {
        self.users.insert(user);
        self.teams.insert(team);
        self.members.insert((team, user));
        self
    }

    pub fn with_platform_admin(mut self, user: UserId) -> Self {
        self.users.insert(user);
        self.platform_admins.insert(user);
        self
    }
}

impl IdentityProvider for StaticIdentity {
    fn user_exists(&self, user_id: UserId) -> bool {
        self.users.contains(&user_id)
    }

    fn team_exists(&self, team_id: TeamId) -> bool {
        self.teams.contains(&team_id)
    }

    fn is_team_admin(&self, team_id: TeamId, user_id: UserId) -> bool {
        self.admins.contains(&(team_id, user_id))
    }

    fn is_team_member(&self, team_id: TeamId, user_id: UserId) -> bool {
        self.members.contains(&(team_id, user_id))
    }

    fn is_platform_admin(&self, user_id: UserId) -> bool {
        self.platform_admins.contains(&user_id)
    }
}

/// Dispatcher that keeps every notification for assertions.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingDispatcher {
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.take().into_iter().map(|n| n.event).collect()
    }
}

impl NotificationDispatcher for RecordingDispatcher {
    fn dispatch(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

pub struct Harness {
    pub env: ServiceEnv,
    pub clock: Arc<FixedClock>,
    pub dispatcher: Arc<RecordingDispatcher>,
}

pub fn harness(identity: StaticIdentity, now: DateTime<Utc>) -> Harness {
    harness_with_config(identity, now, EngineConfig::default())
}

pub fn harness_with_config(
    identity: StaticIdentity,
    now: DateTime<Utc>,
    config: EngineConfig,
) -> Harness {
    let clock = Arc::new(FixedClock::new(now));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let env = ServiceEnv::new(Arc::new(identity), dispatcher.clone(), config)
        .with_clock(clock.clone());
    Harness {
        env,
        clock,
        dispatcher,
    }
}

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(h, min, 0))
        .unwrap()
}

pub fn title(text: &str) -> LocalizedText {
    let mut title = LocalizedText::new();
    title.insert("en".to_string(), text.to_string());
    title
}

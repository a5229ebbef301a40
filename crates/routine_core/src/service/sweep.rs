//! Periodic sweep over active routines.
//!
//! # Responsibility
//! - Advance `next_occurrence` of active routines as time passes.
//! - Complete schedules that ran out of occurrences.
//! - Dispatch reminders due before the next sweep.
//!
//! # Invariants
//! - Each routine is handled on its own; one failure or version conflict
//!   never aborts the rest of the run.
//! - Reminder windows of consecutive runs do not overlap, so one reminder is
//!   dispatched at most once per process.
//! - A reminder set is delivered only while the stored version and
//!   `next_occurrence` still match the copy it was derived from.
//! - A routine that cannot be handled in a run keeps its window lower bound;
//!   the next run covers the reminders it missed.

use crate::collab::notification::NotificationEvent;
use crate::lifecycle::{apply_status, recompute_next_occurrence, RecomputeOutcome};
use crate::model::routine::{Routine, RoutineId, RoutineStatus};
use crate::reminder::reminder_batch;
use crate::repo::routine_repo::{RepoError, RoutineRepository};
use crate::service::context::{all_recipients, attending_recipients, ServiceEnv};
use crate::service::routine_service::RoutineServiceError;
use chrono::{DateTime, TimeDelta, Utc};
use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::Mutex;

/// Passes over one routine per run: the first one plus one re-attempt on a
/// freshly loaded copy after a conflict or a stale reminder set.
const ATTEMPTS_PER_ROUTINE: usize = 2;

/// Counters for one sweep run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    /// Routines whose `next_occurrence` moved and was saved.
    pub advanced: usize,
    pub completed: usize,
    /// Routines whose evaluation failed; previous value kept.
    pub degraded: usize,
    /// Saves rejected because another writer got there first.
    pub conflicts: usize,
    /// Reminder sets dropped because the routine changed after it was read.
    pub stale_batches: usize,
    /// Routines left for the next run after every attempt lost a race.
    pub deferred: usize,
    pub failed: usize,
    pub reminders_dispatched: usize,
    /// Reminder window `(start, end]` covered by this run.
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
}

enum Attempt {
    /// Routine handled; carries the number of reminders dispatched.
    Handled(usize),
    /// Stored state moved underneath this attempt.
    Retry,
}

#[derive(Debug, Default)]
struct SweepCursor {
    window_end: Option<DateTime<Utc>>,
    /// Lower bounds still owed to routines skipped by earlier runs.
    held: HashMap<RoutineId, DateTime<Utc>>,
}

/// Sweep driver. Call `run_once` every `sweep.interval_secs`.
pub struct SweepService<R: RoutineRepository> {
    repo: R,
    env: ServiceEnv,
    cursor: Mutex<SweepCursor>,
}

impl<R: RoutineRepository> SweepService<R> {
    pub fn new(repo: R, env: ServiceEnv) -> Self {
        Self {
            repo,
            env,
            cursor: Mutex::new(SweepCursor::default()),
        }
    }

    /// Runs one sweep at the environment clock's current time.
    pub fn tick(&self) -> Result<SweepReport, RoutineServiceError> {
        self.run_once(self.env.now())
    }

    /// Runs one sweep at `now`.
    ///
    /// # Errors
    /// Only listing the active routines can fail the whole run; per-routine
    /// failures are counted in the report and logged.
    pub fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport, RoutineServiceError> {
        let interval = TimeDelta::seconds(
            i64::try_from(self.env.config.sweep.interval_secs).unwrap_or(i64::MAX),
        );
        let window_end = now.checked_add_signed(interval).unwrap_or(now);

        let mut cursor = self
            .cursor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let window_start = cursor.window_end.unwrap_or(now);

        let mut report = SweepReport {
            window_start: Some(window_start),
            window_end: Some(window_end),
            ..SweepReport::default()
        };

        let ids = self.repo.list_ids_by_status(RoutineStatus::Active)?;
        let mut held = HashMap::new();
        for id in ids {
            report.scanned += 1;
            let lower = cursor
                .held
                .get(&id)
                .map_or(window_start, |owed| (*owed).min(window_start));
            match self.sweep_with_retry(id, now, lower, window_end, &mut report) {
                Ok(Some(dispatched)) => report.reminders_dispatched += dispatched,
                Ok(None) => {
                    report.deferred += 1;
                    held.insert(id, lower);
                    warn!(
                        "event=sweep_routine module=sweep status=skip routine_id={} reason=changed_concurrently",
                        id
                    );
                }
                Err(err) => {
                    report.failed += 1;
                    held.insert(id, lower);
                    error!(
                        "event=sweep_routine module=sweep status=error routine_id={} error={}",
                        id, err
                    );
                }
            }
        }

        cursor.held = held;
        cursor.window_end = Some(
            cursor
                .window_end
                .map_or(window_end, |previous| previous.max(window_end)),
        );
        info!(
            "event=sweep_run module=sweep status=ok scanned={} advanced={} completed={} degraded={} conflicts={} stale={} deferred={} failed={} reminders={}",
            report.scanned,
            report.advanced,
            report.completed,
            report.degraded,
            report.conflicts,
            report.stale_batches,
            report.deferred,
            report.failed,
            report.reminders_dispatched
        );
        Ok(report)
    }

    /// Returns `None` when every attempt lost a race with another writer.
    fn sweep_with_retry(
        &self,
        id: RoutineId,
        now: DateTime<Utc>,
        lower: DateTime<Utc>,
        window_end: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<Option<usize>, RepoError> {
        for _ in 0..ATTEMPTS_PER_ROUTINE {
            if let Attempt::Handled(dispatched) =
                self.sweep_routine(id, now, lower, window_end, report)?
            {
                return Ok(Some(dispatched));
            }
        }
        Ok(None)
    }

    fn sweep_routine(
        &self,
        id: RoutineId,
        now: DateTime<Utc>,
        lower: DateTime<Utc>,
        window_end: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<Attempt, RepoError> {
        let Some(mut routine) = self.repo.get_routine(id)? else {
            return Ok(Attempt::Handled(0));
        };
        if routine.status != RoutineStatus::Active {
            return Ok(Attempt::Handled(0));
        }

        let limits = &self.env.config.evaluation;
        let outcome = recompute_next_occurrence(&mut routine, now, limits);
        if let RecomputeOutcome::Degraded(_) = outcome {
            report.degraded += 1;
        }

        let transition = if outcome.is_exhausted() && self.env.config.sweep.auto_complete_exhausted
        {
            apply_status(&mut routine, RoutineStatus::Completed, now, limits)
        } else {
            None
        };

        if transition.is_some() || outcome.changed() {
            routine.touch(now);
            routine.version = match self.repo.save_routine(&routine) {
                Ok(version) => version,
                Err(RepoError::VersionConflict { .. }) => {
                    report.conflicts += 1;
                    return Ok(Attempt::Retry);
                }
                Err(err) => return Err(err),
            };

            if let Some(transition) = transition {
                report.completed += 1;
                info!(
                    "event=sweep_complete module=sweep status=ok routine_id={} version={}",
                    routine.id, routine.version
                );
                self.env.notify(
                    &all_recipients(&routine),
                    &NotificationEvent::StatusChanged {
                        routine_id: routine.id,
                        from: transition.from,
                        to: transition.to,
                    },
                );
            } else {
                report.advanced += 1;
            }
        }

        self.dispatch_reminders(&routine, lower, window_end, report)
    }

    fn dispatch_reminders(
        &self,
        routine: &Routine,
        lower: DateTime<Utc>,
        window_end: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<Attempt, RepoError> {
        let mut batch = reminder_batch(routine, lower);
        batch.reminders.retain(|reminder| reminder.fire_at <= window_end);
        let Some(occurrence) = batch.occurrence else {
            return Ok(Attempt::Handled(0));
        };
        if batch.reminders.is_empty() {
            return Ok(Attempt::Handled(0));
        }

        let current = self
            .repo
            .get_routine(routine.id)?
            .is_some_and(|stored| batch.is_current_for(&stored));
        if !current {
            report.stale_batches += 1;
            info!(
                "event=sweep_reminders module=sweep status=skip routine_id={} version={} reason=stale_batch",
                routine.id, batch.version
            );
            return Ok(Attempt::Retry);
        }

        let recipients = attending_recipients(routine);
        for reminder in &batch.reminders {
            self.env.notify(
                &recipients,
                &NotificationEvent::Reminder {
                    routine_id: routine.id,
                    occurrence,
                    fire_at: reminder.fire_at,
                    template: reminder.template,
                },
            );
        }
        Ok(Attempt::Handled(batch.reminders.len()))
    }
}

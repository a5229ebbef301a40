//! Pure lifecycle transitions for routine aggregates.
//!
//! # Responsibility
//! - Keep `next_occurrence` consistent with status and schedule.
//! - Apply status transitions on an in-memory aggregate.
//!
//! # Invariants
//! - `Completed` and `Cancelled` routines never carry a next occurrence.
//! - `Paused` and `Archived` keep the last computed value untouched; only a
//!   routine created in one of those statuses gets a freshly evaluated value.
//! - Evaluation failures keep the previous value; they are reported through
//!   `RecomputeOutcome::Degraded` and a `warn!` line, never as an error.
//! - Nothing here touches storage or dispatches notifications.

use crate::model::routine::{Routine, RoutineStatus};
use crate::recurrence::{next_occurrence, resolve_local, EvaluationLimits, RecurrenceError};
use chrono::{DateTime, Utc};
use log::warn;

/// Result of one recompute pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecomputeOutcome {
    /// A fresh value was stored (possibly `None` for an exhausted schedule).
    Updated {
        previous: Option<DateTime<Utc>>,
        next: Option<DateTime<Utc>>,
    },
    /// Status does not take part in evaluation; value kept as-is.
    Skipped,
    /// Evaluation failed; the previous value was kept.
    Degraded(RecurrenceError),
}

impl RecomputeOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, Self::Updated { previous, next } if previous != next)
    }

    /// `true` when an evaluated schedule has run out of occurrences.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Updated { next: None, .. })
    }
}

/// One status change applied to an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub from: RoutineStatus,
    pub to: RoutineStatus,
}

/// Recomputes `routine.next_occurrence` relative to `now`.
///
/// - `Active`: evaluates the schedule; occurrences after the series `end`
///   count as exhausted.
/// - `Completed | Cancelled`: clears the value.
/// - `Paused | Archived`: leaves the value untouched.
pub fn recompute_next_occurrence(
    routine: &mut Routine,
    now: DateTime<Utc>,
    limits: &EvaluationLimits,
) -> RecomputeOutcome {
    if routine.status.clears_occurrence() {
        clear_occurrence(routine)
    } else if routine.status == RoutineStatus::Active {
        evaluate_into(routine, now, limits)
    } else {
        RecomputeOutcome::Skipped
    }
}

/// Computes the first `next_occurrence` of a routine that is not stored yet.
///
/// Every non-terminal status is evaluated here, `Paused` and `Archived`
/// included: a new routine has no earlier value to keep.
pub fn seed_next_occurrence(
    routine: &mut Routine,
    now: DateTime<Utc>,
    limits: &EvaluationLimits,
) -> RecomputeOutcome {
    if routine.status.clears_occurrence() {
        clear_occurrence(routine)
    } else {
        evaluate_into(routine, now, limits)
    }
}

fn clear_occurrence(routine: &mut Routine) -> RecomputeOutcome {
    let previous = routine.next_occurrence.take();
    RecomputeOutcome::Updated {
        previous,
        next: None,
    }
}

fn evaluate_into(
    routine: &mut Routine,
    now: DateTime<Utc>,
    limits: &EvaluationLimits,
) -> RecomputeOutcome {
    let previous = routine.next_occurrence;
    match evaluate(routine, now, limits) {
        Ok(next) => {
            routine.next_occurrence = next;
            RecomputeOutcome::Updated { previous, next }
        }
        Err(err) => {
            warn!(
                "event=occurrence_recompute module=lifecycle status=error routine_id={} error_kind={} kept_value={}",
                routine.id,
                error_kind(&err),
                previous.is_some()
            );
            RecomputeOutcome::Degraded(err)
        }
    }
}

/// Applies `to` and keeps `next_occurrence` consistent with it.
///
/// Returns `None` when the routine already has status `to`; nothing is
/// modified in that case.
pub fn apply_status(
    routine: &mut Routine,
    to: RoutineStatus,
    now: DateTime<Utc>,
    limits: &EvaluationLimits,
) -> Option<StatusTransition> {
    let from = routine.status;
    if from == to {
        return None;
    }
    routine.status = to;
    recompute_next_occurrence(routine, now, limits);
    routine.touch(now);
    Some(StatusTransition { from, to })
}

fn evaluate(
    routine: &Routine,
    now: DateTime<Utc>,
    limits: &EvaluationLimits,
) -> Result<Option<DateTime<Utc>>, RecurrenceError> {
    let next = next_occurrence(
        routine.start,
        routine.recurrence_rule.as_ref(),
        routine.timezone,
        now,
        limits,
    )?;
    let series_end = routine
        .end
        .filter(|_| routine.recurrence_rule.is_some())
        .map(|end| resolve_local(routine.timezone, end));
    Ok(next.filter(|occurrence| series_end.map_or(true, |end| *occurrence <= end)))
}

fn error_kind(err: &RecurrenceError) -> &'static str {
    match err {
        RecurrenceError::InvalidRule(_) => "invalid_rule",
        RecurrenceError::ComputationBound { .. } => "computation_bound",
    }
}

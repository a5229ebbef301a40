//! Next-occurrence evaluation over zoned wall-clock time.
//!
//! # Invariants
//! - A returned occurrence is always strictly after the reference instant.
//! - Occurrences keep the wall-clock time of the first start in the routine
//!   timezone, across DST transitions.
//! - Local times inside a DST gap are read with the offset in effect before
//!   the gap (they move forward by the gap length); ambiguous local times take
//!   the earlier instant.
//! - Monthly/yearly steps that land on a missing date are skipped, not
//!   clamped to the end of the month.

use super::rule::{Frequency, RecurrenceRule, RuleParseError, Termination};
use chrono::{
    DateTime, Datelike, Days, LocalResult, Months, NaiveDate, NaiveDateTime, Offset, TimeDelta,
    TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

const DEFAULT_MAX_ITERATIONS: u32 = 10_000;
const DEFAULT_MAX_LOOKAHEAD_YEARS: u32 = 100;

/// Hard bounds that guarantee evaluation terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvaluationLimits {
    /// Maximum number of schedule periods stepped through in one call.
    pub max_iterations: u32,
    /// Candidates further than this past the reference date are not searched.
    pub max_lookahead_years: u32,
}

impl Default for EvaluationLimits {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_lookahead_years: DEFAULT_MAX_LOOKAHEAD_YEARS,
        }
    }
}

/// Evaluation failures. Both are non-fatal for callers: the previous
/// occurrence should be kept and the failure logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecurrenceError {
    /// The structured rule violates its own invariants.
    InvalidRule(RuleParseError),
    /// Iteration or lookahead bound reached before an answer was found.
    ComputationBound { iterations: u32 },
}

impl Display for RecurrenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRule(err) => write!(f, "invalid recurrence rule: {err}"),
            Self::ComputationBound { iterations } => write!(
                f,
                "no occurrence determinable within the evaluation bound ({iterations} periods)"
            ),
        }
    }
}

impl Error for RecurrenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidRule(err) => Some(err),
            Self::ComputationBound { .. } => None,
        }
    }
}

/// Computes the first occurrence strictly after `reference`.
///
/// - `rule = None` is a single occurrence at `first_start`.
/// - `Ok(None)` means the schedule has no further occurrence (past single
///   occurrence, or `COUNT`/`UNTIL` reached).
///
/// # Errors
/// - `InvalidRule` when `rule.validate()` fails.
/// - `ComputationBound` when `limits` stop the search.
pub fn next_occurrence(
    first_start: NaiveDateTime,
    rule: Option<&RecurrenceRule>,
    timezone: Tz,
    reference: DateTime<Utc>,
    limits: &EvaluationLimits,
) -> Result<Option<DateTime<Utc>>, RecurrenceError> {
    let Some(rule) = rule else {
        let start = resolve_local(timezone, first_start);
        return Ok(Some(start).filter(|start| *start > reference));
    };
    rule.validate().map_err(RecurrenceError::InvalidRule)?;

    let start_date = first_start.date();
    let start_time = first_start.time();
    let reference_date = reference.with_timezone(&timezone).date_naive();
    let horizon = reference_date
        .checked_add_months(Months::new(
            limits.max_lookahead_years.saturating_mul(12),
        ))
        .unwrap_or(NaiveDate::MAX);
    let by_day = rule.sorted_by_day();

    let (count, until) = match rule.termination {
        Some(Termination::Count(count)) => (Some(count), None),
        Some(Termination::Until(until)) => (None, Some(until)),
        None => (None, None),
    };

    // COUNT is relative to the first occurrence, so those rules must be
    // walked from the start.
    let mut period = if count.is_some() {
        0
    } else {
        periods_before(rule, start_date, reference_date)
    };
    let mut produced: u32 = 0;
    let mut iterations: u32 = 0;

    loop {
        let bound = RecurrenceError::ComputationBound { iterations };
        let Some((period_floor, dates)) =
            period_dates(rule.frequency, rule.interval, &by_day, start_date, period)
        else {
            return Err(bound);
        };
        if period_floor > horizon {
            return Err(bound);
        }

        for date in dates {
            if count.is_some_and(|count| produced >= count) {
                return Ok(None);
            }
            let occurrence = resolve_local(timezone, date.and_time(start_time));
            if until.is_some_and(|until| occurrence > until) {
                return Ok(None);
            }
            produced = produced.saturating_add(1);
            if occurrence > reference {
                return Ok(Some(occurrence));
            }
        }

        iterations += 1;
        if iterations >= limits.max_iterations {
            return Err(RecurrenceError::ComputationBound { iterations });
        }
        period += 1;
    }
}

/// Maps a wall-clock time in `timezone` to an instant.
pub fn resolve_local(timezone: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match timezone.from_local_datetime(&local) {
        LocalResult::Single(resolved) => resolved.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let offset = timezone
                .offset_from_utc_datetime(&(local - TimeDelta::days(1)))
                .fix();
            (local - TimeDelta::seconds(i64::from(offset.local_minus_utc()))).and_utc()
        }
    }
}

/// Number of whole periods that end before `reference_date`, minus one for
/// timezone slack. Every candidate inside the skipped periods falls on a local
/// date earlier than `reference_date`.
fn periods_before(rule: &RecurrenceRule, start_date: NaiveDate, reference_date: NaiveDate) -> u64 {
    if reference_date <= start_date {
        return 0;
    }

    let units = match rule.frequency {
        Frequency::Daily => days_between(start_date, reference_date),
        Frequency::Weekly => days_between(week_start(start_date), reference_date) / 7,
        Frequency::Monthly => months_between(start_date, reference_date),
        Frequency::Yearly => months_between(start_date, reference_date) / 12,
    };
    (units / u64::from(rule.interval)).saturating_sub(1)
}

/// Returns the first local date of one period and the candidate dates in it.
///
/// Returns `None` when date arithmetic overflows the calendar range.
fn period_dates(
    frequency: Frequency,
    interval: u32,
    by_day: &[Weekday],
    start_date: NaiveDate,
    period: u64,
) -> Option<(NaiveDate, Vec<NaiveDate>)> {
    let step = period.checked_mul(u64::from(interval))?;
    match frequency {
        Frequency::Daily => {
            let date = start_date.checked_add_days(Days::new(step))?;
            Some((date, vec![date]))
        }
        Frequency::Weekly if by_day.is_empty() => {
            let date = start_date.checked_add_days(Days::new(step.checked_mul(7)?))?;
            Some((date, vec![date]))
        }
        Frequency::Weekly => {
            let period_start =
                week_start(start_date).checked_add_days(Days::new(step.checked_mul(7)?))?;
            let dates = by_day
                .iter()
                .filter_map(|day| {
                    period_start.checked_add_days(Days::new(u64::from(day.num_days_from_monday())))
                })
                .filter(|date| *date >= start_date)
                .collect();
            Some((period_start, dates))
        }
        Frequency::Monthly => month_dates(start_date, step),
        Frequency::Yearly => month_dates(start_date, step.checked_mul(12)?),
    }
}

fn month_dates(start_date: NaiveDate, months: u64) -> Option<(NaiveDate, Vec<NaiveDate>)> {
    let base = i64::from(start_date.year()) * 12 + i64::from(start_date.month0());
    let total = base.checked_add(i64::try_from(months).ok()?)?;
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = u32::try_from(total.rem_euclid(12)).ok()? + 1;
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let candidate = NaiveDate::from_ymd_opt(year, month, start_date.day());
    Some((first, candidate.into_iter().collect()))
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.weekday().num_days_from_monday()))
}

fn days_between(from: NaiveDate, to: NaiveDate) -> u64 {
    u64::try_from(to.signed_duration_since(from).num_days()).unwrap_or(0)
}

fn months_between(from: NaiveDate, to: NaiveDate) -> u64 {
    let from_index = i64::from(from.year()) * 12 + i64::from(from.month0());
    let to_index = i64::from(to.year()) * 12 + i64::from(to.month0());
    u64::try_from(to_index - from_index).unwrap_or(0)
}

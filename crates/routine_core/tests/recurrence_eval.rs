mod common;

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use chrono_tz::America::New_York;
use chrono_tz::Asia::Tehran;
use chrono_tz::UTC;
use common::{local, utc};
use routine_core::recurrence::Termination;
use routine_core::{next_occurrence, parse_rule, EvaluationLimits, RecurrenceError, RuleParseError};

fn next(
    rule: Option<&str>,
    start: chrono::NaiveDateTime,
    tz: chrono_tz::Tz,
    reference: chrono::DateTime<chrono::Utc>,
) -> Option<chrono::DateTime<chrono::Utc>> {
    let rule = rule.map(|text| parse_rule(text).unwrap());
    next_occurrence(start, rule.as_ref(), tz, reference, &EvaluationLimits::default()).unwrap()
}

#[test]
fn weekly_monday_in_tehran_keeps_local_time() {
    let next = next(
        Some("FREQ=WEEKLY;BYDAY=MO"),
        local(2025, 1, 6, 9, 0),
        Tehran,
        utc(2025, 1, 10, 0, 0),
    )
    .unwrap();

    assert_eq!(next.with_timezone(&Tehran).naive_local(), local(2025, 1, 13, 9, 0));
}

#[test]
fn daily_rule_keeps_wall_clock_across_spring_forward() {
    let start = local(2025, 3, 7, 9, 0);
    let before = next(Some("FREQ=DAILY"), start, New_York, utc(2025, 3, 7, 15, 0)).unwrap();
    assert_eq!(before, utc(2025, 3, 8, 14, 0));

    let after = next(Some("FREQ=DAILY"), start, New_York, utc(2025, 3, 8, 15, 0)).unwrap();
    assert_eq!(after, utc(2025, 3, 9, 13, 0));
}

#[test]
fn occurrence_inside_dst_gap_shifts_forward() {
    let next = next(
        Some("FREQ=DAILY"),
        local(2025, 3, 8, 2, 30),
        New_York,
        utc(2025, 3, 8, 12, 0),
    )
    .unwrap();
    assert_eq!(next, utc(2025, 3, 9, 7, 30));
    assert_eq!(
        next.with_timezone(&New_York).naive_local(),
        local(2025, 3, 9, 3, 30)
    );
}

#[test]
fn ambiguous_occurrence_uses_first_instant() {
    let next = next(
        Some("FREQ=DAILY"),
        local(2025, 11, 1, 1, 30),
        New_York,
        utc(2025, 11, 1, 12, 0),
    );
    assert_eq!(next, Some(utc(2025, 11, 2, 5, 30)));
}

#[test]
fn single_occurrence_is_returned_only_while_in_future() {
    let start = local(2025, 6, 1, 10, 0);
    assert_eq!(next(None, start, UTC, utc(2025, 5, 31, 0, 0)), Some(utc(2025, 6, 1, 10, 0)));
    assert_eq!(next(None, start, UTC, utc(2025, 6, 1, 10, 0)), None);
    assert_eq!(next(None, start, UTC, utc(2025, 7, 1, 0, 0)), None);
}

#[test]
fn count_limits_the_series() {
    let start = local(2025, 1, 1, 9, 0);
    assert_eq!(
        next(Some("FREQ=DAILY;COUNT=3"), start, UTC, utc(2025, 1, 2, 10, 0)),
        Some(utc(2025, 1, 3, 9, 0))
    );
    assert_eq!(next(Some("FREQ=DAILY;COUNT=3"), start, UTC, utc(2025, 1, 3, 9, 0)), None);
}

#[test]
fn until_is_inclusive() {
    let start = local(2025, 1, 1, 9, 0);
    let rule = "FREQ=DAILY;UNTIL=20250105T090000Z";
    assert_eq!(
        next(Some(rule), start, UTC, utc(2025, 1, 4, 10, 0)),
        Some(utc(2025, 1, 5, 9, 0))
    );
    assert_eq!(next(Some(rule), start, UTC, utc(2025, 1, 5, 9, 0)), None);
}

#[test]
fn monthly_rule_skips_months_without_the_day() {
    let start = local(2025, 1, 31, 10, 0);
    assert_eq!(
        next(Some("FREQ=MONTHLY"), start, UTC, utc(2025, 2, 1, 0, 0)),
        Some(utc(2025, 3, 31, 10, 0))
    );
    assert_eq!(
        next(Some("FREQ=MONTHLY"), start, UTC, utc(2025, 3, 31, 10, 0)),
        Some(utc(2025, 5, 31, 10, 0))
    );
}

#[test]
fn yearly_leap_day_waits_for_next_leap_year() {
    assert_eq!(
        next(Some("FREQ=YEARLY"), local(2024, 2, 29, 8, 0), UTC, utc(2024, 3, 1, 0, 0)),
        Some(utc(2028, 2, 29, 8, 0))
    );
}

#[test]
fn weekly_multiple_days_step_through_the_week() {
    let start = local(2025, 1, 1, 8, 0);
    let rule = Some("FREQ=WEEKLY;BYDAY=MO,WE,FR");
    assert_eq!(next(rule, start, UTC, utc(2024, 12, 1, 0, 0)), Some(utc(2025, 1, 1, 8, 0)));
    assert_eq!(next(rule, start, UTC, utc(2025, 1, 1, 8, 0)), Some(utc(2025, 1, 3, 8, 0)));
    assert_eq!(next(rule, start, UTC, utc(2025, 1, 3, 9, 0)), Some(utc(2025, 1, 6, 8, 0)));
}

#[test]
fn weekly_interval_skips_alternate_weeks() {
    assert_eq!(
        next(
            Some("FREQ=WEEKLY;INTERVAL=2;BYDAY=TU"),
            local(2025, 1, 7, 18, 0),
            UTC,
            utc(2025, 1, 8, 0, 0)
        ),
        Some(utc(2025, 1, 21, 18, 0))
    );
}

#[test]
fn result_is_always_after_reference() {
    let start = local(2025, 1, 1, 9, 0);
    let rule = parse_rule("FREQ=WEEKLY;BYDAY=TU,TH;INTERVAL=3").unwrap();
    let mut reference = utc(2025, 1, 1, 0, 0);
    for _ in 0..40 {
        let next = next_occurrence(start, Some(&rule), New_York, reference, &EvaluationLimits::default())
            .unwrap()
            .unwrap();
        assert!(next > reference);
        let wall = next.with_timezone(&New_York);
        assert!(matches!(wall.weekday(), Weekday::Tue | Weekday::Thu));
        assert_eq!(wall.time(), NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        reference = next;
    }
}

#[test]
fn weekly_by_day_keeps_weekday_and_wall_clock_across_dst() {
    let rule = parse_rule("FREQ=WEEKLY;BYDAY=MO,FR").unwrap();
    let start = local(2025, 3, 3, 8, 15);
    let mut reference = utc(2025, 3, 3, 0, 0);
    let mut seen = Vec::new();
    for _ in 0..6 {
        let next = next_occurrence(start, Some(&rule), New_York, reference, &EvaluationLimits::default())
            .unwrap()
            .unwrap();
        let wall = next.with_timezone(&New_York);
        assert_eq!(wall.time(), NaiveTime::from_hms_opt(8, 15, 0).unwrap());
        seen.push(wall.date_naive());
        reference = next;
    }
    let expected = [(3, 3), (3, 7), (3, 10), (3, 14), (3, 17), (3, 21)]
        .map(|(m, d)| NaiveDate::from_ymd_opt(2025, m, d).unwrap());
    assert_eq!(seen, expected);
    assert_eq!(
        next_occurrence(start, Some(&rule), New_York, utc(2025, 3, 8, 0, 0), &EvaluationLimits::default())
            .unwrap(),
        Some(utc(2025, 3, 10, 12, 15))
    );
}

#[test]
fn bounded_search_reports_computation_bound() {
    let rule = parse_rule("FREQ=DAILY;COUNT=50000").unwrap();
    let limits = EvaluationLimits {
        max_iterations: 100,
        max_lookahead_years: 100,
    };
    let err = next_occurrence(local(2000, 1, 1, 0, 0), Some(&rule), UTC, utc(2020, 1, 1, 0, 0), &limits)
        .unwrap_err();
    assert!(matches!(err, RecurrenceError::ComputationBound { .. }));
}

#[test]
fn parser_rejects_unsupported_shapes() {
    assert!(matches!(parse_rule("FREQ=HOURLY"), Err(RuleParseError::InvalidFrequency(_))));
    assert!(matches!(
        parse_rule("FREQ=DAILY;BYDAY=MO"),
        Err(RuleParseError::ByDayRequiresWeekly)
    ));
    assert!(matches!(
        parse_rule("FREQ=DAILY;COUNT=2;UNTIL=20250101"),
        Err(RuleParseError::CountWithUntil)
    ));
}

#[test]
fn parsed_rule_prints_canonical_form() {
    let rule = parse_rule("rrule:byday=fr,mo;freq=weekly;count=4").unwrap();
    assert_eq!(rule.termination, Some(Termination::Count(4)));
    assert_eq!(rule.to_string(), "FREQ=WEEKLY;BYDAY=MO,FR;COUNT=4");
}

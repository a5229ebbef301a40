//! Recurrence rule value and its text grammar.
//!
//! Grammar (a strict subset of iCalendar RRULE):
//!
//! ```text
//! [RRULE:]FREQ=DAILY|WEEKLY|MONTHLY|YEARLY
//!         [;INTERVAL=<n >= 1>]
//!         [;BYDAY=MO,TU,WE,TH,FR,SA,SU]      (WEEKLY only)
//!         [;COUNT=<n >= 1> | ;UNTIL=YYYYMMDD[THHMMSSZ]]
//! ```
//!
//! Keys and values are case-insensitive and parts may appear in any order.
//! A date-only `UNTIL` covers the whole UTC day.

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

static UNTIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})(\d{2})(\d{2})(?:T(\d{2})(\d{2})(\d{2})Z)?$").expect("valid until regex")
});

const RULE_PREFIX: &str = "RRULE:";
const UNTIL_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Step unit of a recurring schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
            Self::Yearly => "YEARLY",
        }
    }
}

/// Optional end bound of a recurring schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Total number of occurrences, counted from the first start.
    Count(u32),
    /// Last instant (inclusive) an occurrence may start at.
    Until(DateTime<Utc>),
}

/// Structured recurrence rule.
///
/// Serialized through its canonical text form so stored rules stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    pub interval: u32,
    /// Weekday filter; only valid for `Frequency::Weekly`.
    pub by_day: Vec<Weekday>,
    pub termination: Option<Termination>,
}

impl RecurrenceRule {
    /// Creates an unbounded rule repeating every `interval` units.
    pub fn new(frequency: Frequency, interval: u32) -> Self {
        Self {
            frequency,
            interval,
            by_day: Vec::new(),
            termination: None,
        }
    }

    /// Creates an every-week rule on the given weekdays.
    pub fn weekly_on(days: &[Weekday]) -> Self {
        Self {
            frequency: Frequency::Weekly,
            interval: 1,
            by_day: days.to_vec(),
            termination: None,
        }
    }

    pub fn with_termination(mut self, termination: Termination) -> Self {
        self.termination = Some(termination);
        self
    }

    /// Checks structural invariants that the type system does not encode.
    ///
    /// Rules built by `parse_rule` always pass; rules assembled by hand or
    /// loaded from older data may not.
    pub fn validate(&self) -> Result<(), RuleParseError> {
        if self.interval == 0 {
            return Err(RuleParseError::InvalidInterval("0".to_string()));
        }
        if !self.by_day.is_empty() && self.frequency != Frequency::Weekly {
            return Err(RuleParseError::ByDayRequiresWeekly);
        }
        let mut seen = HashSet::with_capacity(self.by_day.len());
        for day in &self.by_day {
            if !seen.insert(*day) {
                return Err(RuleParseError::DuplicateWeekday(
                    weekday_code(*day).to_string(),
                ));
            }
        }
        if let Some(Termination::Count(0)) = self.termination {
            return Err(RuleParseError::InvalidCount("0".to_string()));
        }
        Ok(())
    }

    /// `by_day` ordered Monday first, as iteration within a week expects.
    pub(crate) fn sorted_by_day(&self) -> Vec<Weekday> {
        let mut days = self.by_day.clone();
        days.sort_by_key(|day| day.num_days_from_monday());
        days
    }
}

impl Display for RecurrenceRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "FREQ={}", self.frequency.as_str())?;
        if self.interval != 1 {
            write!(f, ";INTERVAL={}", self.interval)?;
        }
        if !self.by_day.is_empty() {
            let days = self
                .sorted_by_day()
                .into_iter()
                .map(weekday_code)
                .collect::<Vec<_>>()
                .join(",");
            write!(f, ";BYDAY={days}")?;
        }
        match self.termination {
            Some(Termination::Count(count)) => write!(f, ";COUNT={count}"),
            Some(Termination::Until(until)) => {
                write!(f, ";UNTIL={}", until.format(UNTIL_FORMAT))
            }
            None => Ok(()),
        }
    }
}

impl FromStr for RecurrenceRule {
    type Err = RuleParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        parse_rule(value)
    }
}

impl From<RecurrenceRule> for String {
    fn from(value: RecurrenceRule) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for RecurrenceRule {
    type Error = RuleParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_rule(&value)
    }
}

/// Parses one rule string into a validated `RecurrenceRule`.
pub fn parse_rule(input: &str) -> Result<RecurrenceRule, RuleParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(RuleParseError::Empty);
    }

    let body = match trimmed.get(..RULE_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(RULE_PREFIX) => &trimmed[RULE_PREFIX.len()..],
        _ => trimmed,
    };

    let mut frequency = None;
    let mut interval = 1;
    let mut by_day = Vec::new();
    let mut count = None;
    let mut until = None;
    let mut seen_keys = HashSet::new();

    for part in body.split(';') {
        let part = part.trim();
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| RuleParseError::MalformedPart(part.to_string()))?;
        let key = key.trim().to_ascii_uppercase();
        let value = value.trim();
        if key.is_empty() || value.is_empty() {
            return Err(RuleParseError::MalformedPart(part.to_string()));
        }
        if !seen_keys.insert(key.clone()) {
            return Err(RuleParseError::DuplicateKey(key));
        }

        match key.as_str() {
            "FREQ" => frequency = Some(parse_frequency(value)?),
            "INTERVAL" => interval = parse_positive(value, RuleParseError::InvalidInterval)?,
            "COUNT" => count = Some(parse_positive(value, RuleParseError::InvalidCount)?),
            "UNTIL" => until = Some(parse_until(&value.to_ascii_uppercase())?),
            "BYDAY" => by_day = parse_by_day(value)?,
            _ => return Err(RuleParseError::UnsupportedKey(key)),
        }
    }

    let frequency = frequency.ok_or(RuleParseError::MissingFrequency)?;
    let termination = match (count, until) {
        (Some(_), Some(_)) => return Err(RuleParseError::CountWithUntil),
        (Some(count), None) => Some(Termination::Count(count)),
        (None, Some(until)) => Some(Termination::Until(until)),
        (None, None) => None,
    };

    let rule = RecurrenceRule {
        frequency,
        interval,
        by_day,
        termination,
    };
    rule.validate()?;
    Ok(rule)
}

fn parse_frequency(value: &str) -> Result<Frequency, RuleParseError> {
    match value.to_ascii_uppercase().as_str() {
        "DAILY" => Ok(Frequency::Daily),
        "WEEKLY" => Ok(Frequency::Weekly),
        "MONTHLY" => Ok(Frequency::Monthly),
        "YEARLY" => Ok(Frequency::Yearly),
        _ => Err(RuleParseError::InvalidFrequency(value.to_string())),
    }
}

fn parse_positive(
    value: &str,
    error: fn(String) -> RuleParseError,
) -> Result<u32, RuleParseError> {
    match value.parse::<u32>() {
        Ok(parsed) if parsed >= 1 => Ok(parsed),
        _ => Err(error(value.to_string())),
    }
}

fn parse_until(value: &str) -> Result<DateTime<Utc>, RuleParseError> {
    let invalid = || RuleParseError::InvalidUntil(value.to_string());
    let caps = UNTIL_RE.captures(value).ok_or_else(invalid)?;
    let field = |index: usize| -> Option<u32> { caps.get(index)?.as_str().parse().ok() };

    let year = caps[1].parse::<i32>().map_err(|_| invalid())?;
    let month = field(2).ok_or_else(invalid)?;
    let day = field(3).ok_or_else(invalid)?;
    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)?;

    let naive = if caps.get(4).is_some() {
        let hour = field(4).ok_or_else(invalid)?;
        let minute = field(5).ok_or_else(invalid)?;
        let second = field(6).ok_or_else(invalid)?;
        date.and_hms_opt(hour, minute, second).ok_or_else(invalid)?
    } else {
        date.and_hms_opt(23, 59, 59).ok_or_else(invalid)?
    };
    Ok(naive.and_utc())
}

fn parse_by_day(value: &str) -> Result<Vec<Weekday>, RuleParseError> {
    let mut days = Vec::new();
    for code in value.split(',') {
        let code = code.trim();
        if code.is_empty() {
            return Err(RuleParseError::InvalidWeekday(value.to_string()));
        }
        let day = match code.to_ascii_uppercase().as_str() {
            "MO" => Weekday::Mon,
            "TU" => Weekday::Tue,
            "WE" => Weekday::Wed,
            "TH" => Weekday::Thu,
            "FR" => Weekday::Fri,
            "SA" => Weekday::Sat,
            "SU" => Weekday::Sun,
            _ => return Err(RuleParseError::InvalidWeekday(code.to_string())),
        };
        if days.contains(&day) {
            return Err(RuleParseError::DuplicateWeekday(code.to_ascii_uppercase()));
        }
        days.push(day);
    }
    Ok(days)
}

fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

/// Malformed or structurally invalid recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleParseError {
    Empty,
    MalformedPart(String),
    UnsupportedKey(String),
    DuplicateKey(String),
    MissingFrequency,
    InvalidFrequency(String),
    InvalidInterval(String),
    InvalidCount(String),
    InvalidUntil(String),
    InvalidWeekday(String),
    DuplicateWeekday(String),
    ByDayRequiresWeekly,
    CountWithUntil,
}

impl Display for RuleParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "recurrence rule must not be empty"),
            Self::MalformedPart(part) => write!(f, "malformed rule part `{part}`"),
            Self::UnsupportedKey(key) => write!(f, "unsupported rule key `{key}`"),
            Self::DuplicateKey(key) => write!(f, "rule key `{key}` appears more than once"),
            Self::MissingFrequency => write!(f, "rule is missing FREQ"),
            Self::InvalidFrequency(value) => {
                write!(f, "invalid FREQ `{value}`; expected DAILY|WEEKLY|MONTHLY|YEARLY")
            }
            Self::InvalidInterval(value) => {
                write!(f, "invalid INTERVAL `{value}`; expected an integer >= 1")
            }
            Self::InvalidCount(value) => {
                write!(f, "invalid COUNT `{value}`; expected an integer >= 1")
            }
            Self::InvalidUntil(value) => {
                write!(f, "invalid UNTIL `{value}`; expected YYYYMMDD or YYYYMMDDTHHMMSSZ")
            }
            Self::InvalidWeekday(value) => write!(f, "invalid BYDAY entry `{value}`"),
            Self::DuplicateWeekday(value) => write!(f, "BYDAY lists `{value}` more than once"),
            Self::ByDayRequiresWeekly => write!(f, "BYDAY is only supported with FREQ=WEEKLY"),
            Self::CountWithUntil => write!(f, "COUNT and UNTIL are mutually exclusive"),
        }
    }
}

impl Error for RuleParseError {}

//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `routine_core` linkage.
//! - Evaluate one recurrence rule from the command line.
//!
//! Usage:
//!
//! ```text
//! routine_cli
//! routine_cli next <rule|-> <start YYYY-MM-DDTHH:MM[:SS]> <timezone> [reference RFC 3339]
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use routine_core::{next_occurrence, parse_rule, EvaluationLimits};
use std::process::ExitCode;

const USAGE: &str =
    "usage: routine_cli next <rule|-> <start YYYY-MM-DDTHH:MM[:SS]> <timezone> [reference]";

fn main() -> ExitCode {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        println!("routine_core ping={}", routine_core::ping());
        println!("routine_core version={}", routine_core::core_version());
        return ExitCode::SUCCESS;
    }

    match run(&args) {
        Ok(line) => {
            println!("{line}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<String, String> {
    let [command, rule, start, timezone, rest @ ..] = args else {
        return Err(USAGE.to_string());
    };
    if command != "next" || rest.len() > 1 {
        return Err(USAGE.to_string());
    }

    let rule = if rule == "-" {
        None
    } else {
        Some(parse_rule(rule).map_err(|err| format!("invalid rule: {err}"))?)
    };
    let start = parse_start(start)?;
    let timezone = timezone
        .parse::<Tz>()
        .map_err(|_| format!("unknown timezone `{timezone}`"))?;
    let reference = match rest.first() {
        Some(value) => DateTime::parse_from_rfc3339(value)
            .map_err(|err| format!("invalid reference `{value}`: {err}"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let next = next_occurrence(
        start,
        rule.as_ref(),
        timezone,
        reference,
        &EvaluationLimits::default(),
    )
    .map_err(|err| err.to_string())?;

    Ok(match next {
        Some(at) => format!(
            "next={} local={}",
            at.to_rfc3339(),
            at.with_timezone(&timezone).format("%Y-%m-%dT%H:%M:%S%:z")
        ),
        None => "next=none".to_string(),
    })
}

fn parse_start(value: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .map_err(|_| format!("invalid start `{value}`; expected YYYY-MM-DDTHH:MM[:SS]"))
}

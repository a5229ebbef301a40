//! Recurrence rules and next-occurrence evaluation.
//!
//! # Responsibility
//! - Parse rule strings into structured `RecurrenceRule` values.
//! - Compute the next occurrence of a schedule after a reference instant.
//!
//! # Invariants
//! - Parsing and evaluation are separate steps; the evaluator never sees text.
//! - Evaluation is pure and always terminates (see `EvaluationLimits`).
//! - Step arithmetic happens on zoned wall-clock time, not on UTC offsets.

mod evaluator;
mod rule;

pub use evaluator::{next_occurrence, resolve_local, EvaluationLimits, RecurrenceError};
pub use rule::{parse_rule, Frequency, RecurrenceRule, RuleParseError, Termination};

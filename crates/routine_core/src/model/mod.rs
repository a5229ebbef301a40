//! Domain model for the routine aggregate.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep schedule, participant and reminder state on one aggregate root.
//!
//! # Invariants
//! - Every routine is identified by a stable `RoutineId`.
//! - Routines are never hard-deleted; terminal statuses replace deletion.
//! - Participants are unique by `(kind, id)` within one routine.

pub mod participant;
pub mod routine;

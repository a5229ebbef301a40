//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Apply authorization, lifecycle rules and notifications around writes.
//!
//! # Invariants
//! - Services receive clock, identity, notifier and configuration through
//!   `ServiceEnv`; none of them is global.

pub mod context;
pub mod participant_service;
pub mod query_service;
pub mod routine_service;
pub mod sweep;

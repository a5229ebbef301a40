//! Interfaces to collaborators outside the routine core.
//!
//! # Responsibility
//! - Declare what the core needs from identity, notification and time.
//! - Keep channel, preference and auth implementations out of core.
//!
//! # Invariants
//! - Notification dispatch is fire-and-forget; core correctness never
//!   depends on delivery.

pub mod clock;
pub mod identity;
pub mod notification;

//! Weekly availability schedule evaluation for Herald.
//!
//! This crate decides whether a point in time falls inside a recipient's
//! configured weekly availability windows, and computes the next available
//! instant when it does not. It is pure and deterministic: no I/O, no clock
//! reads, no collaborator calls.
//!
//! Gating is opt-in. An absent or disabled schedule means "always available",
//! so callers can pass whatever the subscriber store returned without
//! special-casing recipients who never configured availability.

mod evaluator;
mod types;

pub use evaluator::{is_within_schedule, next_available_time};
pub use types::{DaySchedule, Schedule, TimeRange, WeeklySchedule, parse_clock};

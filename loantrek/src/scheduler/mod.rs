//! Scheduler module for periodic overdue checks.
//!
//! The scheduler is responsible for:
//! - Re-running the overdue refresh at a fixed period
//! - Reacting to interval changes broadcast by the settings service
//! - Graceful shutdown through a cancellation token

mod poll;

pub use poll::{PollScheduler, PollTask};

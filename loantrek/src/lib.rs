//! loantrek library crate.
//!
//! Overdue equipment-loan notifications: fetching, read-mark reconciliation
//! and periodic polling driven by the service's configured check interval.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod notification;
pub mod scheduler;
pub mod storage;
pub mod utils;

pub use error::{Error, Result};

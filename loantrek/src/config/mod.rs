//! Configuration module.
//!
//! Local process configuration (environment) plus the remote settings
//! service with event broadcasting for interval changes.

pub mod app;
pub mod events;
pub mod service;

pub use app::AppConfig;
pub use events::{SettingsEvent, SettingsEventBroadcaster};
pub use service::{
    DEFAULT_POLL_INTERVAL, INTERVAL_PRESETS, IntervalPreset, SettingsService, SettingsSource,
    resolve_poll_interval,
};

//! Settings change events.
//!
//! Broadcast when the remote settings change so the poll scheduler can pick up
//! a new interval without a restart.

use std::time::Duration;

use tokio::sync::broadcast;

/// Events broadcast when settings change.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsEvent {
    /// The resolved poll interval differs from the last known one.
    PollIntervalChanged {
        previous: Option<Duration>,
        interval: Duration,
    },
    /// Settings were written through this client.
    SettingsUpdated { check_interval_hours: f64 },
}

impl SettingsEvent {
    /// Get a description of the event for logging.
    pub fn description(&self) -> String {
        match self {
            Self::PollIntervalChanged { previous, interval } => match previous {
                Some(previous) => {
                    format!("Poll interval changed: {:?} -> {:?}", previous, interval)
                }
                None => format!("Poll interval set: {:?}", interval),
            },
            Self::SettingsUpdated {
                check_interval_hours,
            } => {
                format!("Settings updated: check every {} hour(s)", check_interval_hours)
            }
        }
    }
}

/// Default channel capacity for settings events.
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Broadcaster for settings events.
///
/// Uses tokio's broadcast channel to distribute events to multiple subscribers.
#[derive(Clone)]
pub struct SettingsEventBroadcaster {
    sender: broadcast::Sender<SettingsEvent>,
}

impl SettingsEventBroadcaster {
    /// Create a new broadcaster with default capacity.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe to settings events.
    pub fn subscribe(&self) -> broadcast::Receiver<SettingsEvent> {
        self.sender.subscribe()
    }

    /// Publish a settings event.
    ///
    /// Returns the number of receivers that received the event.
    /// Returns 0 if there are no active subscribers.
    pub fn publish(&self, event: SettingsEvent) -> usize {
        tracing::debug!("Publishing settings event: {}", event.description());
        // send() returns Err if there are no receivers, which is fine
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for SettingsEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

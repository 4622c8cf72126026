//! Settings service.
//!
//! Reads the overdue check interval from the loan service, resolves it into a
//! poll period and broadcasts changes so the scheduler can be reconfigured.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::{SettingsEvent, SettingsEventBroadcaster};
use crate::api::{ApiClient, Settings, SettingsUpdate};
use crate::{Error, Result};

/// Poll period used when the service has no valid interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Shortest poll period accepted.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Longest poll period accepted (one year).
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A choice offered by the settings screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalPreset {
    pub hours: f64,
    pub label: &'static str,
}

pub const INTERVAL_PRESETS: &[IntervalPreset] = &[
    IntervalPreset { hours: 0.25, label: "Every 15 minutes" },
    IntervalPreset { hours: 0.5, label: "Every 30 minutes" },
    IntervalPreset { hours: 1.0, label: "Every hour" },
    IntervalPreset { hours: 2.0, label: "Every 2 hours" },
    IntervalPreset { hours: 3.0, label: "Every 3 hours" },
    IntervalPreset { hours: 6.0, label: "Every 6 hours" },
    IntervalPreset { hours: 12.0, label: "Every 12 hours" },
    IntervalPreset { hours: 24.0, label: "Once a day" },
];

/// Convert `check_interval_hours` into a poll period.
///
/// Missing, non-positive or non-finite values fall back to
/// [`DEFAULT_POLL_INTERVAL`]; valid values are clamped to
/// [`MIN_POLL_INTERVAL`]..=[`MAX_POLL_INTERVAL`].
pub fn resolve_poll_interval(hours: Option<f64>) -> Duration {
    let Some(hours) = hours else {
        debug!("No check interval configured, using default");
        return DEFAULT_POLL_INTERVAL;
    };

    if !hours.is_finite() || hours <= 0.0 {
        warn!(hours, "Invalid check interval, using default");
        return DEFAULT_POLL_INTERVAL;
    }

    let secs = hours * 3600.0;
    if secs > MAX_POLL_INTERVAL.as_secs_f64() {
        warn!(hours, "Check interval too long, clamping");
        return MAX_POLL_INTERVAL;
    }

    Duration::from_secs_f64(secs).max(MIN_POLL_INTERVAL)
}

/// Where settings are read from and written to.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn fetch_settings(&self) -> Result<Settings>;

    async fn store_settings(&self, update: &SettingsUpdate) -> Result<Settings>;
}

#[async_trait]
impl SettingsSource for ApiClient {
    async fn fetch_settings(&self) -> Result<Settings> {
        self.settings().await
    }

    async fn store_settings(&self, update: &SettingsUpdate) -> Result<Settings> {
        self.update_settings(update).await
    }
}

/// Settings access with interval tracking and change broadcasting.
pub struct SettingsService<S>
where
    S: SettingsSource,
{
    source: Arc<S>,
    broadcaster: SettingsEventBroadcaster,
    current_interval: Mutex<Option<Duration>>,
}

impl<S> SettingsService<S>
where
    S: SettingsSource,
{
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            broadcaster: SettingsEventBroadcaster::new(),
            current_interval: Mutex::new(None),
        }
    }

    // ========== Event Broadcasting ==========

    /// Subscribe to settings events.
    pub fn subscribe(&self) -> broadcast::Receiver<SettingsEvent> {
        self.broadcaster.subscribe()
    }

    // ========== Settings ==========

    /// Fetch the raw settings document.
    pub async fn get_settings(&self) -> Result<Settings> {
        self.source.fetch_settings().await
    }

    /// Last interval resolved by this service, if any.
    pub fn current_interval(&self) -> Option<Duration> {
        *self.current_interval.lock()
    }

    /// Resolve the poll interval, for use at startup.
    ///
    /// Never fails: a fetch error falls back to the last known interval, or
    /// the default when nothing is known yet.
    pub async fn poll_interval(&self) -> Duration {
        match self.source.fetch_settings().await {
            Ok(settings) => {
                let interval = resolve_poll_interval(settings.check_interval_hours);
                *self.current_interval.lock() = Some(interval);
                interval
            }
            Err(e) => {
                let fallback = self.current_interval().unwrap_or(DEFAULT_POLL_INTERVAL);
                warn!(error = %e, fallback = ?fallback, "Failed to load settings");
                fallback
            }
        }
    }

    /// Re-read settings and broadcast if the resolved interval changed.
    ///
    /// Returns the new interval when it changed.
    pub async fn sync(&self) -> Option<Duration> {
        let settings = match self.source.fetch_settings().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "Failed to re-read settings; keeping current interval");
                return None;
            }
        };
        self.record_interval(resolve_poll_interval(settings.check_interval_hours))
    }

    /// Store a new check interval and broadcast the change.
    pub async fn update_interval_hours(&self, hours: f64) -> Result<Duration> {
        if !hours.is_finite() || hours <= 0.0 {
            return Err(Error::validation(format!(
                "check interval must be a positive number of hours, got {hours}"
            )));
        }

        let stored = self
            .source
            .store_settings(&SettingsUpdate {
                check_interval_hours: hours,
            })
            .await?;

        self.broadcaster.publish(SettingsEvent::SettingsUpdated {
            check_interval_hours: hours,
        });

        let interval = resolve_poll_interval(stored.check_interval_hours.or(Some(hours)));
        self.record_interval(interval);
        info!(hours, interval = ?interval, "Check interval updated");
        Ok(interval)
    }

    fn record_interval(&self, interval: Duration) -> Option<Duration> {
        let previous = {
            let mut current = self.current_interval.lock();
            let previous = *current;
            *current = Some(interval);
            previous
        };

        if previous == Some(interval) {
            return None;
        }

        self.broadcaster
            .publish(SettingsEvent::PollIntervalChanged { previous, interval });
        Some(interval)
    }
}

impl<S> SettingsService<S>
where
    S: SettingsSource + 'static,
{
    /// Start a background task that re-reads settings every `every`.
    pub fn spawn_watch(
        self: &Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Settings watch task shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(every) => {
                        if let Some(interval) = service.sync().await {
                            info!(interval = ?interval, "Check interval changed remotely");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Default)]
    struct FakeSource {
        hours: Mutex<Option<f64>>,
        fail: std::sync::atomic::AtomicBool,
    }

    impl FakeSource {
        fn with_hours(hours: Option<f64>) -> Self {
            let source = Self::default();
            *source.hours.lock() = hours;
            source
        }
    }

    #[async_trait]
    impl SettingsSource for FakeSource {
        async fn fetch_settings(&self) -> Result<Settings> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(Error::http_status(
                    reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    "http://test/settings",
                ));
            }
            Ok(Settings {
                check_interval_hours: *self.hours.lock(),
                updated_at: None,
            })
        }

        async fn store_settings(&self, update: &SettingsUpdate) -> Result<Settings> {
            *self.hours.lock() = Some(update.check_interval_hours);
            self.fetch_settings().await
        }
    }

    #[rstest]
    #[case(None, DEFAULT_POLL_INTERVAL)]
    #[case(Some(0.0), DEFAULT_POLL_INTERVAL)]
    #[case(Some(-2.0), DEFAULT_POLL_INTERVAL)]
    #[case(Some(f64::NAN), DEFAULT_POLL_INTERVAL)]
    #[case(Some(f64::INFINITY), DEFAULT_POLL_INTERVAL)]
    #[case(Some(0.25), Duration::from_secs(15 * 60))]
    #[case(Some(1.0), Duration::from_secs(3600))]
    #[case(Some(24.0), Duration::from_secs(24 * 3600))]
    #[case(Some(1e9), MAX_POLL_INTERVAL)]
    #[case(Some(1e-9), MIN_POLL_INTERVAL)]
    fn test_resolve_poll_interval(#[case] hours: Option<f64>, #[case] expected: Duration) {
        assert_eq!(resolve_poll_interval(hours), expected);
    }

    #[test]
    fn test_presets_resolve_to_valid_intervals() {
        for preset in INTERVAL_PRESETS {
            let interval = resolve_poll_interval(Some(preset.hours));
            assert_eq!(interval.as_secs_f64(), preset.hours * 3600.0, "{}", preset.label);
        }
    }

    #[tokio::test]
    async fn test_poll_interval_falls_back_on_failure() {
        let source = Arc::new(FakeSource::with_hours(Some(0.5)));
        let service = SettingsService::new(source.clone());

        assert_eq!(service.poll_interval().await, Duration::from_secs(1800));

        source.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        // Last known value wins over the default.
        assert_eq!(service.poll_interval().await, Duration::from_secs(1800));

        let fresh = SettingsService::new(source);
        assert_eq!(fresh.poll_interval().await, DEFAULT_POLL_INTERVAL);
    }

    #[tokio::test]
    async fn test_sync_publishes_only_on_change() {
        let source = Arc::new(FakeSource::with_hours(Some(1.0)));
        let service = SettingsService::new(source.clone());
        service.poll_interval().await;
        let mut events = service.subscribe();

        assert_eq!(service.sync().await, None);
        assert!(events.try_recv().is_err());

        *source.hours.lock() = Some(0.25);
        assert_eq!(service.sync().await, Some(Duration::from_secs(900)));
        assert_eq!(
            events.recv().await.unwrap(),
            SettingsEvent::PollIntervalChanged {
                previous: Some(Duration::from_secs(3600)),
                interval: Duration::from_secs(900),
            }
        );
    }

    #[tokio::test]
    async fn test_sync_failure_keeps_interval() {
        let source = Arc::new(FakeSource::with_hours(Some(2.0)));
        let service = SettingsService::new(source.clone());
        service.poll_interval().await;

        source.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        assert_eq!(service.sync().await, None);
        assert_eq!(service.current_interval(), Some(Duration::from_secs(7200)));
    }

    #[tokio::test]
    async fn test_update_interval_hours() {
        let source = Arc::new(FakeSource::with_hours(Some(1.0)));
        let service = SettingsService::new(source.clone());
        service.poll_interval().await;
        let mut events = service.subscribe();

        let interval = service.update_interval_hours(0.25).await.unwrap();

        assert_eq!(interval, Duration::from_secs(900));
        assert_eq!(*source.hours.lock(), Some(0.25));
        assert!(matches!(
            events.recv().await.unwrap(),
            SettingsEvent::SettingsUpdated { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            SettingsEvent::PollIntervalChanged { .. }
        ));
    }

    #[rstest]
    #[case(0.0)]
    #[case(-1.0)]
    #[case(f64::NAN)]
    #[tokio::test]
    async fn test_update_interval_rejects_invalid(#[case] hours: f64) {
        let source = Arc::new(FakeSource::with_hours(Some(1.0)));
        let service = SettingsService::new(source.clone());

        let err = service.update_interval_hours(hours).await.unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(*source.hours.lock(), Some(1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_task_detects_remote_change() {
        let source = Arc::new(FakeSource::with_hours(Some(1.0)));
        let service = Arc::new(SettingsService::new(source.clone()));
        service.poll_interval().await;
        let mut events = service.subscribe();
        let cancel = CancellationToken::new();

        let handle = service.spawn_watch(Duration::from_secs(60), cancel.clone());
        *source.hours.lock() = Some(6.0);

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            SettingsEvent::PollIntervalChanged {
                previous: Some(Duration::from_secs(3600)),
                interval: Duration::from_secs(6 * 3600),
            }
        );

        cancel.cancel();
        handle.await.unwrap();
    }
}

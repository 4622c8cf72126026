//! Restartable fixed-period poll scheduler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::SettingsEvent;

/// Work invoked on every poll tick.
///
/// Failures are handled inside `run`; a failed tick never stops the schedule.
#[async_trait]
pub trait PollTask: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn run(&self);
}

struct ActiveSchedule {
    interval: Duration,
    token: CancellationToken,
    _handle: JoinHandle<()>,
}

/// Runs a [`PollTask`] every `interval`.
///
/// The period is measured from the end of one tick to the start of the next,
/// so ticks never overlap and fetch latency does not accumulate. Changing the
/// interval cancels the running schedule and starts a new one; the first tick
/// of the new schedule fires one full new interval later.
pub struct PollScheduler {
    task: Arc<dyn PollTask>,
    cancellation_token: CancellationToken,
    active: Mutex<Option<ActiveSchedule>>,
}

impl PollScheduler {
    pub fn new(task: Arc<dyn PollTask>) -> Self {
        Self::with_cancellation(task, CancellationToken::new())
    }

    /// Create a scheduler whose schedules stop when `token` is cancelled.
    pub fn with_cancellation(task: Arc<dyn PollTask>, token: CancellationToken) -> Self {
        Self {
            task,
            cancellation_token: token,
            active: Mutex::new(None),
        }
    }

    /// Start polling: one tick now, then every `interval`.
    ///
    /// Replaces any running schedule.
    pub fn start(&self, interval: Duration) {
        self.spawn_schedule(interval, true);
    }

    /// Switch to a new period.
    ///
    /// Returns `false` when `interval` equals the running period, in which
    /// case the schedule is left untouched.
    pub fn reconfigure(&self, interval: Duration) -> bool {
        if self.current_interval() == Some(interval) {
            debug!(interval = ?interval, "Poll interval unchanged");
            return false;
        }
        self.spawn_schedule(interval, false);
        true
    }

    /// Stop the running schedule, if any.
    pub fn stop(&self) {
        if let Some(active) = self.active.lock().take() {
            active.token.cancel();
            info!(task = self.task.name(), "Poll schedule stopped");
        }
    }

    /// Stop the schedule and every listener attached to this scheduler.
    pub fn shutdown(&self) {
        self.stop();
        self.cancellation_token.cancel();
    }

    pub fn current_interval(&self) -> Option<Duration> {
        self.active.lock().as_ref().map(|a| a.interval)
    }

    fn spawn_schedule(&self, interval: Duration, run_immediately: bool) {
        let mut active = self.active.lock();
        let previous = active.take().map(|prev| {
            prev.token.cancel();
            prev.interval
        });

        let token = self.cancellation_token.child_token();
        let handle = tokio::spawn(run_schedule(
            Arc::clone(&self.task),
            interval,
            run_immediately,
            token.clone(),
        ));

        *active = Some(ActiveSchedule {
            interval,
            token,
            _handle: handle,
        });

        info!(
            task = self.task.name(),
            interval = ?interval,
            previous = ?previous,
            "Poll schedule started"
        );
    }

    /// React to [`SettingsEvent::PollIntervalChanged`] until shutdown.
    pub fn spawn_settings_listener(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<SettingsEvent>,
    ) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        let token = self.cancellation_token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!("Settings listener shutting down");
                        break;
                    }
                    event = events.recv() => match event {
                        Ok(SettingsEvent::PollIntervalChanged { interval, .. }) => {
                            scheduler.reconfigure(interval);
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Settings listener lagged behind");
                        }
                        Err(RecvError::Closed) => {
                            debug!("Settings event channel closed");
                            break;
                        }
                    }
                }
            }
        })
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.token.cancel();
        }
    }
}

async fn run_schedule(
    task: Arc<dyn PollTask>,
    interval: Duration,
    run_immediately: bool,
    token: CancellationToken,
) {
    if run_immediately && !token.is_cancelled() {
        trace!(task = task.name(), "Initial poll tick");
        task.run().await;
    }

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(task = task.name(), "Poll schedule cancelled");
                break;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        trace!(task = task.name(), "Poll tick");
        task.run().await;
    }
}

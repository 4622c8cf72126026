//! Reconciliation of overdue loans against the local read set.
//!
//! The reconciler holds the most recently fetched overdue list and derives the
//! badge count and the panel items from it. Phases:
//!
//! - `Loading`: no successful fetch yet
//! - `Ready`: last fetch succeeded
//! - `Stale`: last fetch failed, previous data retained
//!
//! The badge count is computed over the *full* fetched list while the panel
//! only shows the first [`PANEL_ITEM_LIMIT`] items. "Mark all read" marks the
//! displayed items only (unless [`MarkAllScope::All`] is configured), so a
//! later refresh can bring the badge back for loans that were never shown.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use super::overdue::OverdueQuery;
use super::read_marks::{ReadMarkSet, ReadMarkStore};
use crate::api::OverdueLoan;
use crate::scheduler::PollTask;
use crate::{Error, Result};

/// Number of overdue items shown in the notification panel.
pub const PANEL_ITEM_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPhase {
    #[default]
    Loading,
    Ready,
    Stale,
}

impl fmt::Display for NotificationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading => write!(f, "loading"),
            Self::Ready => write!(f, "ready"),
            Self::Stale => write!(f, "stale"),
        }
    }
}

/// Which ids "mark all read" adds to the read set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkAllScope {
    /// Only the items currently displayed in the panel.
    #[default]
    Displayed,
    /// Every overdue item from the last fetch.
    All,
}

impl FromStr for MarkAllScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "displayed" => Ok(Self::Displayed),
            "all" => Ok(Self::All),
            other => Err(Error::config(format!(
                "Unknown mark-all scope '{other}' (expected 'displayed' or 'all')"
            ))),
        }
    }
}

impl fmt::Display for MarkAllScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Displayed => write!(f, "displayed"),
            Self::All => write!(f, "all"),
        }
    }
}

/// Result of a single [`NotificationReconciler::refresh`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Fetch succeeded and the state was replaced.
    Updated,
    /// Fetch failed; previous state retained.
    Failed,
    /// Another refresh was already in flight.
    Skipped,
}

/// Derived notification state handed to consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationSnapshot {
    pub phase: NotificationPhase,
    pub unread_count: usize,
    /// First [`PANEL_ITEM_LIMIT`] loans that are not read, in server order.
    ///
    /// Can be non-empty while `unread_count` is 0: mark-all-read in the
    /// displayed scope zeroes the badge but leaves loans beyond the panel
    /// unread.
    pub unread_items: Vec<OverdueLoan>,
    /// First [`PANEL_ITEM_LIMIT`] loans of the last fetch, read or not.
    pub displayed_items: Vec<OverdueLoan>,
    pub total_overdue: usize,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl NotificationSnapshot {
    pub fn is_read(&self, loan_id: &str) -> bool {
        self.displayed_items.iter().any(|l| l.id == loan_id)
            && !self.unread_items.iter().any(|l| l.id == loan_id)
    }
}

/// Number of loans whose id is not in `read`.
pub fn count_unread(loans: &[OverdueLoan], read: &ReadMarkSet) -> usize {
    loans.iter().filter(|loan| !read.contains(&loan.id)).count()
}

/// First `limit` loans whose id is not in `read`, keeping server order.
pub fn unread_items(
    loans: &[OverdueLoan],
    read: &ReadMarkSet,
    limit: usize,
) -> Vec<OverdueLoan> {
    loans
        .iter()
        .filter(|loan| !read.contains(&loan.id))
        .take(limit)
        .cloned()
        .collect()
}

#[derive(Debug, Default)]
struct ReconcilerState {
    phase: NotificationPhase,
    loans: Vec<OverdueLoan>,
    displayed: Vec<OverdueLoan>,
    read_marks: ReadMarkSet,
    marks_loaded: bool,
    unread_count: usize,
    last_refreshed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl ReconcilerState {
    fn apply_fetch(&mut self, loans: Vec<OverdueLoan>) {
        self.displayed = loans.iter().take(PANEL_ITEM_LIMIT).cloned().collect();
        self.loans = loans;
        self.recount();
        self.phase = NotificationPhase::Ready;
        self.last_refreshed_at = Some(Utc::now());
        self.last_error = None;
    }

    fn apply_failure(&mut self, error: &Error) {
        // Loading stays Loading until the first success.
        if self.phase == NotificationPhase::Ready {
            self.phase = NotificationPhase::Stale;
        }
        self.last_error = Some(error.to_string());
    }

    fn recount(&mut self) {
        self.unread_count = count_unread(&self.loans, &self.read_marks);
    }

    fn snapshot(&self) -> NotificationSnapshot {
        NotificationSnapshot {
            phase: self.phase,
            unread_count: self.unread_count,
            unread_items: unread_items(&self.loans, &self.read_marks, PANEL_ITEM_LIMIT),
            displayed_items: self.displayed.clone(),
            total_overdue: self.loans.len(),
            last_refreshed_at: self.last_refreshed_at,
            last_error: self.last_error.clone(),
        }
    }
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Combines [`OverdueQuery`] results with the [`ReadMarkStore`].
///
/// Mark operations always reconcile against the most recently fetched list
/// and never wait on the network. State changes are published through a
/// `watch` channel.
pub struct NotificationReconciler<Q, S>
where
    Q: OverdueQuery,
    S: ReadMarkStore,
{
    query: Arc<Q>,
    store: Arc<S>,
    state: Mutex<ReconcilerState>,
    refresh_in_flight: AtomicBool,
    mark_all_scope: MarkAllScope,
    snapshot_tx: watch::Sender<NotificationSnapshot>,
}

impl<Q, S> NotificationReconciler<Q, S>
where
    Q: OverdueQuery,
    S: ReadMarkStore,
{
    pub fn new(query: Arc<Q>, store: Arc<S>) -> Self {
        let state = ReconcilerState::default();
        let (snapshot_tx, _) = watch::channel(state.snapshot());
        Self {
            query,
            store,
            state: Mutex::new(state),
            refresh_in_flight: AtomicBool::new(false),
            mark_all_scope: MarkAllScope::default(),
            snapshot_tx,
        }
    }

    pub fn with_mark_all_scope(mut self, scope: MarkAllScope) -> Self {
        self.mark_all_scope = scope;
        self
    }

    pub fn mark_all_scope(&self) -> MarkAllScope {
        self.mark_all_scope
    }

    /// Latest published state.
    pub fn snapshot(&self) -> NotificationSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<NotificationSnapshot> {
        self.snapshot_tx.subscribe()
    }

    #[cfg(test)]
    fn is_refreshing(&self) -> bool {
        self.refresh_in_flight.load(Ordering::Acquire)
    }

    fn publish(&self, state: &ReconcilerState) {
        self.snapshot_tx.send_replace(state.snapshot());
    }

    async fn ensure_marks_loaded(&self, state: &mut ReconcilerState) -> Result<()> {
        if !state.marks_loaded {
            state.read_marks = self.store.load().await?;
            state.marks_loaded = true;
        }
        Ok(())
    }

    /// Fetch overdue loans and recompute the derived state.
    ///
    /// A refresh requested while another is in flight is skipped so that an
    /// older response can never be applied after a newer one.
    pub async fn refresh(&self) -> RefreshOutcome {
        if self.refresh_in_flight.swap(true, Ordering::AcqRel) {
            debug!("Overdue refresh already in flight, skipping");
            return RefreshOutcome::Skipped;
        }
        let _guard = InFlightGuard(&self.refresh_in_flight);

        let result = self.query.fetch().await;

        let mut state = self.state.lock().await;
        let outcome = match result {
            Ok(loans) => {
                match self.store.load().await {
                    Ok(read_marks) => {
                        state.read_marks = read_marks;
                        state.marks_loaded = true;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to load read marks; keeping the last known set");
                    }
                }
                state.apply_fetch(loans);
                debug!(
                    total = state.loans.len(),
                    unread = state.unread_count,
                    "Overdue notifications refreshed"
                );
                RefreshOutcome::Updated
            }
            Err(e) => {
                warn!(
                    error = %e,
                    network = e.is_network(),
                    phase = %state.phase,
                    "Failed to fetch overdue loans; keeping last known state"
                );
                state.apply_failure(&e);
                RefreshOutcome::Failed
            }
        };
        self.publish(&state);
        outcome
    }

    /// Mark a single notification as read.
    ///
    /// The count is recomputed from the held list, not re-fetched. Nothing
    /// changes when the mark cannot be persisted.
    pub async fn mark_read(&self, loan_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        self.ensure_marks_loaded(&mut state).await?;

        let mut marks = state.read_marks.clone();
        marks.insert(loan_id.to_string());
        self.store.save(&marks).await?;

        state.read_marks = marks;
        state.recount();
        self.publish(&state);

        debug!(loan_id, unread = state.unread_count, "Marked notification read");
        Ok(())
    }

    /// Mark every notification in scope as read and zero the badge.
    ///
    /// Returns how many ids were newly added to the read set.
    pub async fn mark_all_read(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        self.ensure_marks_loaded(&mut state).await?;

        let in_scope = match self.mark_all_scope {
            MarkAllScope::Displayed => &state.displayed,
            MarkAllScope::All => &state.loans,
        };

        let mut marks = state.read_marks.clone();
        let mut added = 0;
        for loan in in_scope {
            if marks.insert(loan.id.clone()) {
                added += 1;
            }
        }
        self.store.save(&marks).await?;

        state.read_marks = marks;
        state.unread_count = 0;
        self.publish(&state);

        info!(
            added,
            scope = %self.mark_all_scope,
            "Marked all notifications read"
        );
        Ok(added)
    }

    /// Forget every read mark and refresh from the service.
    pub async fn clear_read_marks(&self) -> Result<RefreshOutcome> {
        {
            let mut state = self.state.lock().await;
            self.store.clear().await?;
            state.read_marks.clear();
            state.marks_loaded = true;
            state.recount();
            self.publish(&state);
        }

        info!("Cleared notification read marks");
        Ok(self.refresh().await)
    }
}

#[async_trait]
impl<Q, S> PollTask for NotificationReconciler<Q, S>
where
    Q: OverdueQuery + 'static,
    S: ReadMarkStore + 'static,
{
    fn name(&self) -> &'static str {
        "overdue-refresh"
    }

    async fn run(&self) {
        self.refresh().await;
    }
}

//! Overdue loan notifications.
//!
//! Fetches overdue loans, merges them with the locally persisted read marks
//! and derives the unread badge count and the panel items.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use loantrek::notification::{HttpOverdueQuery, LocalReadMarkStore, NotificationReconciler};
//! use loantrek::storage::FileKeyValueStore;
//!
//! let query = Arc::new(HttpOverdueQuery::new(client));
//! let store = Arc::new(LocalReadMarkStore::new(Arc::new(FileKeyValueStore::new(path))));
//! let reconciler = NotificationReconciler::new(query, store);
//! reconciler.refresh().await;
//! println!("{} unread", reconciler.snapshot().unread_count);
//! ```

pub mod overdue;
pub mod read_marks;
pub mod reconciler;

pub use overdue::{HttpOverdueQuery, OverdueQuery};
pub use read_marks::{LocalReadMarkStore, READ_MARKS_KEY, ReadMarkSet, ReadMarkStore};
pub use reconciler::{
    MarkAllScope, NotificationPhase, NotificationReconciler, NotificationSnapshot,
    PANEL_ITEM_LIMIT, RefreshOutcome, count_unread,
};

//! Asynchronous bridge between per-service cache databases and UI list
//! models.
//!
//! Each cache instance owns one dedicated worker thread that performs every
//! piece of database I/O, including the first open/migration. The owning
//! (UI) thread queues writes, requests refreshes and commits, and folds the
//! worker's queued events into a visible row set through minimal
//! insert/remove/update diffs, so scroll position and selection survive a
//! refresh, and the UI thread never blocks on the disk.

pub mod diff;
mod model;
mod pending;
mod row;
mod worker;

pub use diff::DiffOp;
pub use model::{CacheListModel, ModelObserver};
pub use pending::PendingQueue;
pub use row::{ModelRow, Role, RoleMap, KEY_ROLE};
pub use worker::{CacheStore, CacheWorkerBridge, EventSink, ModelEvent};

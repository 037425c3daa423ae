use feedcache_storage::{Row, Value};

use crate::diff::{self, DiffOp};
use crate::row::{ModelRow, Role};
use crate::worker::{CacheStore, CacheWorkerBridge, ModelEvent};

/// Range notifications mirroring what a list view consumes.
///
/// All methods default to no-ops so observers implement only what they need.
pub trait ModelObserver {
    fn rows_inserted(&mut self, _index: usize, _count: usize) {}
    fn rows_removed(&mut self, _index: usize, _count: usize) {}
    fn row_changed(&mut self, _index: usize) {}
    fn commit_finished(&mut self, _ok: bool) {}
}

/// UI-facing list of cached rows, kept in sync with the worker through
/// minimal diffs: a refresh that changes two rows notifies about two rows,
/// never the whole view.
///
/// The model lives on the owning thread. Worker results arrive as queued
/// events; [`drain_events`](Self::drain_events) folds them into the visible
/// row set, typically wired to an event-loop wakeup or called once per UI
/// tick.
pub struct CacheListModel {
    bridge: CacheWorkerBridge,
    rows: Vec<ModelRow>,
    observer: Option<Box<dyn ModelObserver>>,
    last_commit: Option<bool>,
}

impl CacheListModel {
    pub fn new<S: CacheStore>(store: S) -> Self {
        Self {
            bridge: CacheWorkerBridge::new(store),
            rows: Vec::new(),
            observer: None,
            last_commit: None,
        }
    }

    pub fn set_observer(&mut self, observer: Box<dyn ModelObserver>) {
        self.observer = Some(observer);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn data(&self, index: usize, role: Role) -> Option<&Value> {
        self.rows.get(index)?.get(role)
    }

    pub fn row(&self, index: usize) -> Option<&ModelRow> {
        self.rows.get(index)
    }

    /// Ask the worker for a fresh read (coalesced while one is in flight).
    pub fn refresh(&self) {
        self.bridge.request_refresh();
    }

    /// Ask the worker to persist the queued writes.
    pub fn commit(&self) {
        self.bridge.request_commit();
    }

    pub fn queue_insert(&self, id: impl Into<String>, row: Row) {
        self.bridge.queue_insert(id, row);
    }

    pub fn queue_update(&self, id: impl Into<String>, row: Row) {
        self.bridge.queue_update(id, row);
    }

    pub fn queue_remove(&self, id: impl Into<String>) {
        self.bridge.queue_remove(id);
    }

    /// Terminal status of the most recent commit, if any finished yet.
    pub fn last_commit_ok(&self) -> Option<bool> {
        self.last_commit
    }

    /// Fold every queued worker event into the visible rows. Returns the
    /// number of events handled.
    pub fn drain_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.bridge.events().try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    fn handle_event(&mut self, event: ModelEvent) {
        match event {
            ModelEvent::DataReady(incoming) => {
                let ops = diff::reconcile(&self.rows, &incoming, |row| row.key().cloned());
                let observer = &mut self.observer;
                diff::apply(&mut self.rows, &incoming, &ops, |op| {
                    let Some(observer) = observer.as_deref_mut() else {
                        return;
                    };
                    match op {
                        DiffOp::Insert { index, count, .. } => observer.rows_inserted(index, count),
                        DiffOp::Remove { index, count } => observer.rows_removed(index, count),
                        DiffOp::Update { index, .. } => observer.row_changed(index),
                    }
                });
            }
            ModelEvent::RowUpdated { index, row } => {
                if index < self.rows.len() {
                    self.rows[index] = row;
                    if let Some(observer) = self.observer.as_deref_mut() {
                        observer.row_changed(index);
                    }
                } else {
                    tracing::warn!(index, rows = self.rows.len(), "row update outside the visible range");
                }
            }
            ModelEvent::CommitFinished { ok } => {
                self.last_commit = Some(ok);
                if let Some(observer) = self.observer.as_deref_mut() {
                    observer.commit_finished(ok);
                }
            }
        }
    }
}

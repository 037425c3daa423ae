use std::collections::{BTreeMap, BTreeSet};

use feedcache_storage::Row;

/// Writes accumulated on the owning thread between commits, keyed by each
/// entity's logical id.
///
/// Later operations on the same id supersede earlier ones: a removal cancels
/// a pending insert or update, and a fresh insert cancels a pending removal.
/// The worker swaps the whole queue out at the start of a commit; a failed
/// commit drops the batch: a transient failure against a local single-writer
/// database is a bug, not a retryable fault.
#[derive(Debug, Default)]
pub struct PendingQueue {
    inserts: BTreeMap<String, Row>,
    updates: BTreeMap<String, Row>,
    removals: BTreeSet<String>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_insert(&mut self, id: impl Into<String>, row: Row) {
        let id = id.into();
        self.removals.remove(&id);
        self.updates.remove(&id);
        self.inserts.insert(id, row);
    }

    /// Queue a partial update. If an insert for the same id is still
    /// pending, the changed columns are folded into it instead.
    pub fn queue_update(&mut self, id: impl Into<String>, row: Row) {
        let id = id.into();
        self.removals.remove(&id);
        if let Some(pending) = self.inserts.get_mut(&id) {
            for (column, value) in row.iter() {
                pending.set(column, value.clone());
            }
            return;
        }
        match self.updates.get_mut(&id) {
            Some(pending) => {
                for (column, value) in row.iter() {
                    pending.set(column, value.clone());
                }
            }
            None => {
                self.updates.insert(id, row);
            }
        }
    }

    pub fn queue_remove(&mut self, id: impl Into<String>) {
        let id = id.into();
        self.inserts.remove(&id);
        self.updates.remove(&id);
        self.removals.insert(id);
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.removals.is_empty()
    }

    /// Drain this queue, leaving it empty.
    pub fn take(&mut self) -> PendingQueue {
        std::mem::take(self)
    }

    pub fn inserts(&self) -> impl Iterator<Item = (&str, &Row)> {
        self.inserts.iter().map(|(id, row)| (id.as_str(), row))
    }

    pub fn updates(&self) -> impl Iterator<Item = (&str, &Row)> {
        self.updates.iter().map(|(id, row)| (id.as_str(), row))
    }

    pub fn removals(&self) -> impl Iterator<Item = &str> {
        self.removals.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedcache_storage::Value;

    fn row(title: &str) -> Row {
        let mut row = Row::new();
        row.set("title", title);
        row
    }

    #[test]
    fn removal_cancels_pending_insert_and_update() {
        let mut queue = PendingQueue::new();
        queue.queue_insert("p1", row("a"));
        queue.queue_update("p2", row("b"));
        queue.queue_remove("p1");
        queue.queue_remove("p2");

        assert_eq!(queue.inserts().count(), 0);
        assert_eq!(queue.updates().count(), 0);
        let removed: Vec<_> = queue.removals().collect();
        assert_eq!(removed, vec!["p1", "p2"]);
    }

    #[test]
    fn insert_cancels_pending_removal() {
        let mut queue = PendingQueue::new();
        queue.queue_remove("p1");
        queue.queue_insert("p1", row("back again"));

        assert_eq!(queue.removals().count(), 0);
        assert_eq!(queue.inserts().count(), 1);
    }

    #[test]
    fn update_folds_into_pending_insert() {
        let mut queue = PendingQueue::new();
        let mut initial = row("a");
        initial.set("favorited", false);
        queue.queue_insert("p1", initial);

        let mut change = Row::new();
        change.set("favorited", true);
        queue.queue_update("p1", change);

        assert_eq!(queue.updates().count(), 0);
        let (_, pending) = queue.inserts().next().expect("pending insert");
        assert_eq!(pending.get("title"), Some(&Value::Text("a".into())));
        assert_eq!(pending.get("favorited"), Some(&Value::Boolean(true)));
    }

    #[test]
    fn successive_updates_merge() {
        let mut queue = PendingQueue::new();
        queue.queue_update("p1", row("a"));
        let mut second = Row::new();
        second.set("body", "text");
        queue.queue_update("p1", second);

        let (_, pending) = queue.updates().next().expect("pending update");
        assert_eq!(pending.get("title"), Some(&Value::Text("a".into())));
        assert_eq!(pending.get("body"), Some(&Value::Text("text".into())));
    }

    #[test]
    fn take_leaves_the_queue_empty() {
        let mut queue = PendingQueue::new();
        queue.queue_insert("p1", row("a"));
        let drained = queue.take();
        assert!(!drained.is_empty());
        assert!(queue.is_empty());
    }
}

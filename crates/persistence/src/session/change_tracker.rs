use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{PendingChange, RecordKey};

/// Staged writes of one session, keyed by record.
///
/// A later change to the same record replaces the earlier one, so a flush
/// writes each record at most once.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    pending: Mutex<BTreeMap<RecordKey, PendingChange>>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, BTreeMap<RecordKey, PendingChange>> {
        // Staged data stays consistent per insert, so a poisoned lock is still usable.
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn stage(&self, change: PendingChange) {
        let key = change.key().clone();
        self.pending().insert(key, change);
    }

    /// Staged change for `key`, if any.
    pub fn get(&self, key: &RecordKey) -> Option<PendingChange> {
        self.pending().get(key).cloned()
    }

    /// Staged changes for one entity type.
    pub fn pending_for(&self, entity_type: &str) -> Vec<PendingChange> {
        self.pending()
            .values()
            .filter(|c| c.key().entity_type == entity_type)
            .cloned()
            .collect()
    }

    /// Take every staged change, leaving the tracker empty.
    pub fn drain(&self) -> Vec<PendingChange> {
        std::mem::take(&mut *self.pending()).into_values().collect()
    }

    /// Put back changes from a failed flush.
    ///
    /// Changes staged after the drain win over restored ones.
    pub fn restore(&self, changes: Vec<PendingChange>) {
        let mut pending = self.pending();
        for change in changes {
            pending.entry(change.key().clone()).or_insert(change);
        }
    }

    pub fn len(&self) -> usize {
        self.pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending().is_empty()
    }

    pub fn clear(&self) {
        self.pending().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upsert(id: &str, v: i64) -> PendingChange {
        PendingChange::Upsert {
            key: RecordKey::new("page", id),
            payload: json!({ "v": v }),
        }
    }

    #[test]
    fn later_change_replaces_earlier() {
        let tracker = ChangeTracker::new();
        tracker.stage(upsert("a", 1));
        tracker.stage(upsert("a", 2));
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.get(&RecordKey::new("page", "a")), Some(upsert("a", 2)));

        tracker.stage(PendingChange::Delete {
            key: RecordKey::new("page", "a"),
        });
        assert!(matches!(
            tracker.get(&RecordKey::new("page", "a")),
            Some(PendingChange::Delete { .. })
        ));
    }

    #[test]
    fn restore_does_not_clobber_newer_changes() {
        let tracker = ChangeTracker::new();
        tracker.stage(upsert("a", 1));
        tracker.stage(upsert("b", 1));

        let drained = tracker.drain();
        assert_eq!(drained.len(), 2);
        assert!(tracker.is_empty());

        tracker.stage(upsert("a", 5));
        tracker.restore(drained);

        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.get(&RecordKey::new("page", "a")), Some(upsert("a", 5)));
        assert_eq!(tracker.get(&RecordKey::new("page", "b")), Some(upsert("b", 1)));
    }

    #[test]
    fn pending_for_filters_by_entity_type() {
        let tracker = ChangeTracker::new();
        tracker.stage(upsert("a", 1));
        tracker.stage(PendingChange::Delete {
            key: RecordKey::new("post", "x"),
        });
        assert_eq!(tracker.pending_for("page").len(), 1);
        assert_eq!(tracker.pending_for("post").len(), 1);
        assert!(tracker.pending_for("setting").is_empty());
    }
}

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::error::SessionError;

use super::{ChangeTracker, PendingChange, PersistenceSession, RecordKey, SessionTransaction};

/// Shared in-memory "database" for tests/dev.
///
/// Holds committed records only. Several sessions may point at the same
/// store, the way several connections point at one database.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<BTreeMap<RecordKey, JsonValue>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Committed value of one record.
    pub fn get(&self, key: &RecordKey) -> Result<Option<JsonValue>, SessionError> {
        let records = self
            .records
            .read()
            .map_err(|_| SessionError::LockPoisoned("in-memory store"))?;
        Ok(records.get(key).cloned())
    }

    /// Committed records of one entity type.
    pub fn records_of(&self, entity_type: &str) -> Result<Vec<(RecordKey, JsonValue)>, SessionError> {
        let records = self
            .records
            .read()
            .map_err(|_| SessionError::LockPoisoned("in-memory store"))?;
        Ok(records
            .iter()
            .filter(|(k, _)| k.entity_type == entity_type)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply a set of writes atomically (all under one lock).
    fn apply(&self, writes: BTreeMap<RecordKey, Option<JsonValue>>) -> Result<usize, SessionError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| SessionError::LockPoisoned("in-memory store"))?;

        let mut affected = 0;
        for (key, value) in writes {
            match value {
                Some(payload) => {
                    records.insert(key, payload);
                    affected += 1;
                }
                None => {
                    if records.remove(&key).is_some() {
                        affected += 1;
                    }
                }
            }
        }
        Ok(affected)
    }
}

/// One-shot failures and latencies injected into an [`InMemorySession`].
///
/// Each `fail_*` entry fires once, on the next matching operation.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    pub fail_begin: Option<String>,
    pub fail_flush: Option<String>,
    pub fail_commit: Option<String>,
    pub fail_rollback: Option<String>,
    pub flush_latency: Option<Duration>,
    pub commit_latency: Option<Duration>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_begin(mut self, msg: impl Into<String>) -> Self {
        self.fail_begin = Some(msg.into());
        self
    }

    pub fn fail_flush(mut self, msg: impl Into<String>) -> Self {
        self.fail_flush = Some(msg.into());
        self
    }

    pub fn fail_commit(mut self, msg: impl Into<String>) -> Self {
        self.fail_commit = Some(msg.into());
        self
    }

    pub fn fail_rollback(mut self, msg: impl Into<String>) -> Self {
        self.fail_rollback = Some(msg.into());
        self
    }

    pub fn flush_latency(mut self, latency: Duration) -> Self {
        self.flush_latency = Some(latency);
        self
    }

    pub fn commit_latency(mut self, latency: Duration) -> Self {
        self.commit_latency = Some(latency);
        self
    }
}

/// Counters describing what happened on a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub begun: usize,
    pub committed: usize,
    pub rolled_back: usize,
    /// Transactions whose handle was dropped without commit or rollback.
    pub released_unfinished: usize,
    pub flushes: usize,
    pub records_flushed: usize,
    pub closed: usize,
}

#[derive(Debug, Default)]
struct Counters {
    begun: AtomicUsize,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
    released_unfinished: AtomicUsize,
    flushes: AtomicUsize,
    records_flushed: AtomicUsize,
    closed: AtomicUsize,
}

#[derive(Debug)]
struct OpenTransaction {
    generation: u64,
    overlay: BTreeMap<RecordKey, Option<JsonValue>>,
}

#[derive(Debug)]
struct Shared {
    store: Arc<InMemoryStore>,
    open: Mutex<Option<OpenTransaction>>,
    faults: Mutex<FaultPlan>,
    counters: Counters,
    generation: AtomicU64,
    closed: AtomicBool,
}

impl Shared {
    fn open(&self) -> MutexGuard<'_, Option<OpenTransaction>> {
        self.open.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn faults(&self) -> MutexGuard<'_, FaultPlan> {
        self.faults.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    /// Value visible to this session: open transaction overlay first, then the store.
    fn visible(&self, key: &RecordKey) -> Result<Option<JsonValue>, SessionError> {
        if let Some(tx) = self.open().as_ref() {
            if let Some(value) = tx.overlay.get(key) {
                return Ok(value.clone());
            }
        }
        self.store.get(key)
    }
}

/// In-memory persistence session for tests/dev.
///
/// Writes flushed inside a transaction are buffered in an overlay that only
/// reaches the [`InMemoryStore`] on commit.
#[derive(Debug)]
pub struct InMemorySession {
    shared: Arc<Shared>,
    tracker: ChangeTracker,
}

impl InMemorySession {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                open: Mutex::new(None),
                faults: Mutex::new(FaultPlan::default()),
                counters: Counters::default(),
                generation: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
            tracker: ChangeTracker::new(),
        }
    }

    pub fn arc(store: Arc<InMemoryStore>) -> Arc<Self> {
        Arc::new(Self::new(store))
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.shared.store
    }

    /// Replace the fault plan.
    pub fn set_faults(&self, plan: FaultPlan) {
        *self.shared.faults() = plan;
    }

    pub fn fail_next_begin(&self, msg: impl Into<String>) {
        self.shared.faults().fail_begin = Some(msg.into());
    }

    pub fn fail_next_flush(&self, msg: impl Into<String>) {
        self.shared.faults().fail_flush = Some(msg.into());
    }

    pub fn fail_next_commit(&self, msg: impl Into<String>) {
        self.shared.faults().fail_commit = Some(msg.into());
    }

    pub fn fail_next_rollback(&self, msg: impl Into<String>) {
        self.shared.faults().fail_rollback = Some(msg.into());
    }

    pub fn has_open_transaction(&self) -> bool {
        self.shared.open().is_some()
    }

    pub fn stats(&self) -> SessionStats {
        let c = &self.shared.counters;
        SessionStats {
            begun: c.begun.load(Ordering::SeqCst),
            committed: c.committed.load(Ordering::SeqCst),
            rolled_back: c.rolled_back.load(Ordering::SeqCst),
            released_unfinished: c.released_unfinished.load(Ordering::SeqCst),
            flushes: c.flushes.load(Ordering::SeqCst),
            records_flushed: c.records_flushed.load(Ordering::SeqCst),
            closed: c.closed.load(Ordering::SeqCst),
        }
    }
}

#[async_trait::async_trait]
impl PersistenceSession for InMemorySession {
    fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    async fn fetch(&self, key: &RecordKey) -> Result<Option<JsonValue>, SessionError> {
        self.shared.ensure_open()?;
        self.shared.visible(key)
    }

    async fn fetch_all(&self, entity_type: &str) -> Result<Vec<(RecordKey, JsonValue)>, SessionError> {
        self.shared.ensure_open()?;

        let mut merged: BTreeMap<RecordKey, JsonValue> =
            self.shared.store.records_of(entity_type)?.into_iter().collect();

        if let Some(tx) = self.shared.open().as_ref() {
            for (key, value) in tx.overlay.iter().filter(|(k, _)| k.entity_type == entity_type) {
                match value {
                    Some(v) => {
                        merged.insert(key.clone(), v.clone());
                    }
                    None => {
                        merged.remove(key);
                    }
                }
            }
        }

        Ok(merged.into_iter().collect())
    }

    async fn flush(&self, changes: Vec<PendingChange>) -> Result<usize, SessionError> {
        self.shared.ensure_open()?;

        let (failure, latency) = {
            let mut faults = self.shared.faults();
            (faults.fail_flush.take(), faults.flush_latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(msg) = failure {
            return Err(SessionError::Injected(msg));
        }

        let mut writes = BTreeMap::new();
        let mut affected = 0;
        for change in changes {
            match change {
                PendingChange::Upsert { key, payload } => {
                    affected += 1;
                    writes.insert(key, Some(payload));
                }
                PendingChange::Delete { key } => {
                    if self.shared.visible(&key)?.is_some() {
                        affected += 1;
                    }
                    writes.insert(key, None);
                }
            }
        }

        let outside_transaction = {
            let mut open = self.shared.open();
            match open.as_mut() {
                Some(tx) => {
                    tx.overlay.extend(writes);
                    None
                }
                None => Some(writes),
            }
        };
        if let Some(writes) = outside_transaction {
            self.shared.store.apply(writes)?;
        }

        let c = &self.shared.counters;
        c.flushes.fetch_add(1, Ordering::SeqCst);
        c.records_flushed.fetch_add(affected, Ordering::SeqCst);
        Ok(affected)
    }

    async fn begin_transaction(&self) -> Result<Box<dyn SessionTransaction>, SessionError> {
        self.shared.ensure_open()?;

        if let Some(msg) = self.shared.faults().fail_begin.take() {
            return Err(SessionError::Injected(msg));
        }

        let mut open = self.shared.open();
        if open.is_some() {
            return Err(SessionError::Database(
                "session already has an open transaction".to_string(),
            ));
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *open = Some(OpenTransaction {
            generation,
            overlay: BTreeMap::new(),
        });
        self.shared.counters.begun.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(InMemoryTransaction {
            shared: self.shared.clone(),
            generation,
            finished: false,
        }))
    }

    async fn close(&self) -> Result<(), SessionError> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        self.shared.open().take();
        self.tracker.clear();
        self.shared.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

struct InMemoryTransaction {
    shared: Arc<Shared>,
    generation: u64,
    finished: bool,
}

impl InMemoryTransaction {
    /// Remove this transaction's overlay from the session, if it is still the open one.
    fn take_overlay(&self) -> Option<BTreeMap<RecordKey, Option<JsonValue>>> {
        let mut open = self.shared.open();
        match open.as_ref() {
            Some(tx) if tx.generation == self.generation => open.take().map(|tx| tx.overlay),
            _ => None,
        }
    }
}

#[async_trait::async_trait]
impl SessionTransaction for InMemoryTransaction {
    async fn commit(&mut self) -> Result<(), SessionError> {
        if self.finished {
            return Err(SessionError::Database("transaction already finished".to_string()));
        }
        self.shared.ensure_open()?;

        let (failure, latency) = {
            let mut faults = self.shared.faults();
            (faults.fail_commit.take(), faults.commit_latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(msg) = failure {
            return Err(SessionError::Injected(msg));
        }

        let overlay = self.take_overlay().unwrap_or_default();
        self.finished = true;
        self.shared.store.apply(overlay)?;
        self.shared.counters.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SessionError> {
        if self.finished {
            return Ok(());
        }

        if let Some(msg) = self.shared.faults().fail_rollback.take() {
            return Err(SessionError::Injected(msg));
        }

        self.take_overlay();
        self.finished = true;
        self.shared.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.take_overlay();
            self.shared
                .counters
                .released_unfinished
                .fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(id: &str) -> RecordKey {
        RecordKey::new("page", id)
    }

    fn upsert(id: &str, title: &str) -> PendingChange {
        PendingChange::Upsert {
            key: key(id),
            payload: json!({ "title": title }),
        }
    }

    #[tokio::test]
    async fn flush_without_transaction_writes_through() {
        let store = InMemoryStore::arc();
        let session = InMemorySession::new(store.clone());

        let n = session.flush(vec![upsert("a", "A"), upsert("b", "B")]).await.unwrap();
        assert_eq!(n, 2);
        assert_eq!(store.get(&key("a")).unwrap(), Some(json!({ "title": "A" })));

        let n = session
            .flush(vec![PendingChange::Delete { key: key("a") }, PendingChange::Delete { key: key("zz") }])
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn transaction_overlay_is_private_until_commit() {
        let store = InMemoryStore::arc();
        let session = InMemorySession::new(store.clone());
        let other = InMemorySession::new(store.clone());

        let mut tx = session.begin_transaction().await.unwrap();
        session.flush(vec![upsert("a", "A")]).await.unwrap();

        assert!(session.fetch(&key("a")).await.unwrap().is_some());
        assert!(other.fetch(&key("a")).await.unwrap().is_none());

        tx.commit().await.unwrap();
        assert!(other.fetch(&key("a")).await.unwrap().is_some());
        assert_eq!(session.stats().committed, 1);
    }

    #[tokio::test]
    async fn rollback_and_drop_discard_overlay() {
        let store = InMemoryStore::arc();
        let session = InMemorySession::new(store.clone());

        let mut tx = session.begin_transaction().await.unwrap();
        session.flush(vec![upsert("a", "A")]).await.unwrap();
        tx.rollback().await.unwrap();
        drop(tx);
        assert!(store.is_empty());

        let tx = session.begin_transaction().await.unwrap();
        session.flush(vec![upsert("b", "B")]).await.unwrap();
        drop(tx);
        assert!(store.is_empty());
        assert!(!session.has_open_transaction());

        let stats = session.stats();
        assert_eq!(stats.rolled_back, 1);
        assert_eq!(stats.released_unfinished, 1);
    }

    #[tokio::test]
    async fn failed_commit_keeps_transaction_for_rollback() {
        let store = InMemoryStore::arc();
        let session = InMemorySession::new(store.clone());
        session.fail_next_commit("network down");

        let mut tx = session.begin_transaction().await.unwrap();
        session.flush(vec![upsert("a", "A")]).await.unwrap();

        let err = tx.commit().await.unwrap_err();
        assert_eq!(err, SessionError::Injected("network down".into()));
        assert!(session.has_open_transaction());

        tx.rollback().await.unwrap();
        assert!(!session.has_open_transaction());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn fetch_all_merges_overlay() {
        let store = InMemoryStore::arc();
        let session = InMemorySession::new(store.clone());
        session.flush(vec![upsert("a", "A"), upsert("b", "B")]).await.unwrap();

        let _tx = session.begin_transaction().await.unwrap();
        session
            .flush(vec![PendingChange::Delete { key: key("a") }, upsert("c", "C")])
            .await
            .unwrap();

        let ids: Vec<_> = session
            .fetch_all("page")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k.entity_id)
            .collect();
        assert_eq!(ids, vec!["b".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn second_close_is_rejected() {
        let session = InMemorySession::new(InMemoryStore::arc());
        session.close().await.unwrap();
        assert_eq!(session.close().await.unwrap_err(), SessionError::Closed);
        assert_eq!(session.stats().closed, 1);
        assert!(matches!(session.fetch(&key("a")).await, Err(SessionError::Closed)));
    }

    #[tokio::test]
    async fn injected_begin_failure_fires_once() {
        let session = InMemorySession::new(InMemoryStore::arc());
        session.set_faults(FaultPlan::new().fail_begin("no connections"));
        assert!(session.begin_transaction().await.is_err());
        assert!(session.begin_transaction().await.is_ok());
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stocker_core::{Entity, EntityId};
use stocker_persistence::session::{FaultPlan, InMemorySession, InMemoryStore};
use stocker_persistence::{
    CancelSignal, EventLevel, LifecycleEvent, MemorySink, PersistenceSession, PersistentEntity,
    ReadRepository, Repository, SessionError, SessionRef, TransactionOp, UnitOfWork, UowError,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Order {
    id: EntityId,
    customer: String,
    total_cents: i64,
}

impl Entity for Order {
    type Id = EntityId;
    fn id(&self) -> &EntityId {
        &self.id
    }
}

impl PersistentEntity for Order {
    const ENTITY_TYPE: &'static str = "order";
}

fn order(customer: &str, total_cents: i64) -> Order {
    Order {
        id: EntityId::new(),
        customer: customer.to_string(),
        total_cents,
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    session: Arc<InMemorySession>,
    sink: Arc<MemorySink>,
    uow: UnitOfWork,
}

fn harness() -> Harness {
    let store = InMemoryStore::arc();
    let session = InMemorySession::arc(store.clone());
    let sink = MemorySink::arc();
    let uow = UnitOfWork::builder()
        .context("sales")
        .session(session.clone())
        .sink(sink.clone())
        .build()
        .unwrap();
    Harness {
        store,
        session,
        sink,
        uow,
    }
}

fn none() -> CancelSignal {
    CancelSignal::none()
}

// Example scenarios

#[tokio::test]
async fn begin_then_commit_without_pending_changes() {
    let h = harness();

    h.uow.begin_transaction(&none()).await.unwrap();
    assert!(h.uow.has_active_transaction());

    h.uow.commit_transaction(&none()).await.unwrap();
    assert!(!h.uow.has_active_transaction());
    assert_eq!(h.session.stats().committed, 1);
    assert_eq!(h.sink.count_at(EventLevel::Info), 1);
}

#[tokio::test]
async fn second_begin_fails_and_first_transaction_stays_active() {
    let h = harness();
    h.uow.begin_transaction(&none()).await.unwrap();
    let first = h.uow.correlation_id().unwrap();

    let err = h.uow.begin_transaction(&none()).await.unwrap_err();
    assert!(matches!(
        err,
        UowError::InvalidState {
            operation: TransactionOp::Begin,
            ..
        }
    ));
    assert!(h.uow.has_active_transaction());
    assert_eq!(h.session.stats().begun, 1);

    // The surviving transaction is still the first one and still commits.
    let repo = h.uow.repository::<Order>().unwrap();
    repo.add(order("acme", 1_000)).await.unwrap();
    h.uow.commit_transaction(&none()).await.unwrap();
    assert_eq!(h.store.len(), 1);

    let committed = h
        .sink
        .events()
        .into_iter()
        .find(|e| matches!(e, LifecycleEvent::TransactionCommitted { .. }))
        .unwrap();
    assert_eq!(committed.correlation_id(), Some(first));
}

#[tokio::test]
async fn flush_failure_during_commit_rolls_back_and_propagates() {
    let h = harness();
    h.uow.begin_transaction(&none()).await.unwrap();
    h.uow
        .repository::<Order>()
        .unwrap()
        .add(order("acme", 2_500))
        .await
        .unwrap();
    h.session.fail_next_flush("disk full");

    let err = h.uow.commit_transaction(&none()).await.unwrap_err();

    assert!(matches!(
        err,
        UowError::Session(SessionError::Injected(ref msg)) if msg == "disk full"
    ));
    assert!(!h.uow.has_active_transaction());
    assert!(!h.session.has_open_transaction());
    assert!(h.store.is_empty());
    assert_eq!(h.session.stats().rolled_back, 1);
    assert_eq!(h.session.stats().committed, 0);

    let levels: Vec<_> = h.sink.events().iter().map(|e| e.level()).collect();
    assert_eq!(
        levels,
        vec![EventLevel::Debug, EventLevel::Error, EventLevel::Warn]
    );

    // Unflushed changes survive, and the unit of work is usable again.
    assert_eq!(h.session.tracker().len(), 1);
    h.uow.begin_transaction(&none()).await.unwrap();
    h.uow.commit_transaction(&none()).await.unwrap();
    assert_eq!(h.store.len(), 1);
}

#[tokio::test]
async fn commit_without_begin_is_invalid_state() {
    let h = harness();

    let err = h.uow.commit_transaction(&none()).await.unwrap_err();
    assert!(matches!(
        err,
        UowError::InvalidState {
            operation: TransactionOp::Commit,
            correlation_id: None,
            ..
        }
    ));

    let err = h.uow.rollback_transaction(&none()).await.unwrap_err();
    assert!(matches!(
        err,
        UowError::InvalidState {
            operation: TransactionOp::Rollback,
            ..
        }
    ));
    assert_eq!(h.sink.count_at(EventLevel::Error), 2);
}

#[tokio::test]
async fn second_commit_reports_last_correlation_id() {
    let h = harness();

    h.uow.begin_transaction(&none()).await.unwrap();
    let begun = h.uow.correlation_id().unwrap();
    h.uow.commit_transaction(&none()).await.unwrap();

    let err = h.uow.commit_transaction(&none()).await.unwrap_err();
    assert!(matches!(
        err,
        UowError::InvalidState {
            operation: TransactionOp::Commit,
            correlation_id: Some(id),
            ..
        } if id == begun
    ));
    assert!(err.to_string().contains(&begun.to_string()));

    let err = h.uow.rollback_transaction(&none()).await.unwrap_err();
    assert!(matches!(
        err,
        UowError::InvalidState {
            operation: TransactionOp::Rollback,
            correlation_id: Some(id),
            ..
        } if id == begun
    ));

    let events = h.sink.events();
    let invalid: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, LifecycleEvent::InvalidState { .. }))
        .collect();
    assert_eq!(invalid.len(), 2);
    assert!(invalid.iter().all(|e| e.correlation_id() == Some(begun)));
}

trait OrderQueries: Send + Sync {
    fn session(&self) -> &SessionRef;
}

struct CountingOrders {
    session: SessionRef,
}

impl OrderQueries for CountingOrders {
    fn session(&self) -> &SessionRef {
        &self.session
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_access_yields_one_instance() {
    const TASKS: usize = 32;
    let h = harness();
    let uow = Arc::new(h.uow);
    let constructed = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(tokio::sync::Barrier::new(TASKS));

    let tasks: Vec<_> = (0..TASKS)
        .map(|_| {
            let uow = uow.clone();
            let constructed = constructed.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                uow.domain_repository::<dyn OrderQueries, _, _>(|session| {
                    constructed.fetch_add(1, Ordering::SeqCst);
                    CountingOrders { session }
                })
                .unwrap()
            })
        })
        .collect();

    let mut repos = Vec::with_capacity(TASKS);
    for task in tasks {
        repos.push(task.await.unwrap());
    }

    assert_eq!(constructed.load(Ordering::SeqCst), 1);
    assert!(repos.iter().all(|r| Arc::ptr_eq(r, &repos[0])));

    let later = uow
        .domain_repository::<dyn OrderQueries, _, _>(|session| {
            constructed.fetch_add(1, Ordering::SeqCst);
            CountingOrders { session }
        })
        .unwrap();
    assert!(Arc::ptr_eq(&later, &repos[0]));
    assert_eq!(constructed.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(later.session(), uow.session()));
}

#[tokio::test]
async fn dispose_with_active_transaction_rolls_back_once() {
    let h = harness();
    h.uow.begin_transaction(&none()).await.unwrap();
    h.uow
        .repository::<Order>()
        .unwrap()
        .add(order("acme", 100))
        .await
        .unwrap();
    assert_eq!(h.uow.save_changes(&none()).await.unwrap(), 1);

    h.uow.dispose().await.unwrap();

    assert!(!h.uow.has_active_transaction());
    assert!(h.store.is_empty());
    assert!(h.session.is_closed());
    assert!(h.sink.events().iter().any(|e| matches!(
        e,
        LifecycleEvent::DisposedWithActiveTransaction { .. }
    ) && e.level() == EventLevel::Error));

    h.uow.dispose().await.unwrap();
    let stats = h.session.stats();
    assert_eq!(stats.rolled_back, 1);
    assert_eq!(stats.closed, 1);
    assert_eq!(stats.released_unfinished, 0);
}

// Further properties

#[tokio::test]
async fn generic_accessors_share_one_cached_repository() {
    let h = harness();
    let write = h.uow.repository::<Order>().unwrap();
    let read = h.uow.read_repository::<Order>().unwrap();
    let again = h.uow.repository::<Order>().unwrap();

    assert_eq!(Arc::as_ptr(&write) as *const (), Arc::as_ptr(&read) as *const ());
    assert!(Arc::ptr_eq(&write, &again));
    assert_eq!(h.uow.cached_repositories(), 1);
}

#[tokio::test]
async fn accessors_fail_after_dispose() {
    let h = harness();
    h.uow.repository::<Order>().unwrap();
    h.uow.dispose().await.unwrap();

    assert!(matches!(h.uow.repository::<Order>(), Err(UowError::Disposed)));
    assert!(matches!(h.uow.read_repository::<Order>(), Err(UowError::Disposed)));
    assert!(matches!(
        h.uow.domain_repository::<dyn OrderQueries, _, _>(|session| CountingOrders { session }),
        Err(UowError::Disposed)
    ));
    assert!(matches!(h.uow.save_entities(&none()).await, Err(UowError::Disposed)));
}

#[tokio::test]
async fn staged_changes_are_visible_before_save() {
    let h = harness();
    let repo = h.uow.repository::<Order>().unwrap();
    let o = order("acme", 42);
    repo.add(o.clone()).await.unwrap();

    let read = h.uow.read_repository::<Order>().unwrap();
    assert_eq!(read.get(&o.id).await.unwrap(), Some(o));
    assert!(h.store.is_empty());

    assert!(h.uow.save_entities(&none()).await.unwrap());
    assert_eq!(h.store.len(), 1);
    assert!(!h.uow.save_entities(&none()).await.unwrap());
}

#[tokio::test]
async fn commit_is_visible_to_a_fresh_session_and_rollback_is_not() {
    let h = harness();
    let repo = h.uow.repository::<Order>().unwrap();

    let kept = order("kept", 1);
    h.uow.begin_transaction(&none()).await.unwrap();
    repo.add(kept.clone()).await.unwrap();
    h.uow.commit_transaction(&none()).await.unwrap();

    let dropped = order("dropped", 2);
    h.uow.begin_transaction(&none()).await.unwrap();
    repo.add(dropped.clone()).await.unwrap();
    h.uow.save_changes(&none()).await.unwrap();
    assert!(repo.exists(&dropped.id).await.unwrap());
    h.uow.rollback_transaction(&none()).await.unwrap();

    let fresh = UnitOfWork::new("sales", InMemorySession::arc(h.store.clone()));
    let view = fresh.read_repository::<Order>().unwrap();
    assert_eq!(view.list().await.unwrap(), vec![kept]);
    assert!(!view.exists(&dropped.id).await.unwrap());
    fresh.dispose().await.unwrap();
}

#[tokio::test]
async fn dropping_undisposed_unit_of_work_commits_nothing() {
    let h = harness();
    h.uow.begin_transaction(&none()).await.unwrap();
    h.uow
        .repository::<Order>()
        .unwrap()
        .add(order("leak", 7))
        .await
        .unwrap();
    h.uow.save_changes(&none()).await.unwrap();

    let Harness {
        store,
        session,
        sink,
        uow,
    } = h;
    drop(uow);

    assert!(store.is_empty());
    assert!(!session.has_open_transaction());
    assert_eq!(session.stats().released_unfinished, 1);
    assert!(matches!(
        sink.events().last(),
        Some(LifecycleEvent::DisposedWithActiveTransaction { .. })
    ));
}

#[tokio::test]
async fn dispose_reports_rollback_failure_once() {
    let h = harness();
    h.uow.begin_transaction(&none()).await.unwrap();
    h.session.fail_next_rollback("connection reset");

    let err = h.uow.dispose().await.unwrap_err();
    assert!(matches!(err, UowError::Session(SessionError::Injected(_))));
    assert!(!h.uow.has_active_transaction());
    assert!(!h.session.has_open_transaction());
    assert!(h.session.is_closed());

    h.uow.dispose().await.unwrap();
}

#[tokio::test]
async fn cancelled_save_restores_pending_changes() {
    let h = harness();
    h.session
        .set_faults(FaultPlan::new().flush_latency(Duration::from_secs(5)));
    h.uow
        .repository::<Order>()
        .unwrap()
        .add(order("slow", 5))
        .await
        .unwrap();

    let cancel = CancelSignal::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let err = h.uow.save_changes(&cancel).await.unwrap_err();
    assert!(matches!(err, UowError::Cancelled));
    assert!(h.store.is_empty());
    assert_eq!(h.session.tracker().len(), 1);
}

#[tokio::test]
async fn sibling_begins_are_serialized() {
    let h = harness();
    let cancel = none();

    let (a, b) = tokio::join!(
        h.uow.begin_transaction(&cancel),
        h.uow.begin_transaction(&cancel)
    );

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert!(h.uow.has_active_transaction());
    assert_eq!(h.session.stats().begun, 1);
}

#[test]
fn blocking_paths_work_without_a_runtime() {
    let h = harness();
    let save = h.uow.save_changes_blocking().unwrap();
    assert_eq!(save, 0);

    h.uow.dispose_blocking().unwrap();
    h.uow.dispose_blocking().unwrap();
    assert_eq!(h.session.stats().closed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_dispose_inside_runtime_matches_async_dispose() {
    let h = harness();
    h.uow.begin_transaction(&none()).await.unwrap();

    h.uow.dispose_blocking().unwrap();

    assert!(!h.uow.has_active_transaction());
    assert_eq!(h.session.stats().rolled_back, 1);
    assert!(h.sink.events().iter().any(|e| matches!(
        e,
        LifecycleEvent::DisposedWithActiveTransaction { .. }
    )));
    h.uow.dispose().await.unwrap();
}

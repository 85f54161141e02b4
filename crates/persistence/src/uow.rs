//! Transactional unit of work.
//!
//! A [`UnitOfWork`] owns one persistence session for the duration of a logical
//! operation. It hands out cached repositories over that session, runs an
//! explicit transaction state machine, and owns disposal.
//!
//! ## Transaction state machine
//!
//! ```text
//!                    begin
//!   NoTransaction ───────────▶ TransactionActive
//!         ▲                          │
//!         └──── commit / rollback ───┘
//! ```
//!
//! - `begin` while active fails with `InvalidState`; the running transaction is
//!   left untouched (no nesting, no silent reuse).
//! - `commit` / `rollback` while idle fail with `InvalidState`.
//! - `commit` flushes pending changes, then commits. Any failure along the way
//!   rolls the transaction back before the original error is returned.
//! - After every commit or rollback, successful or not, the handle is released
//!   and the unit of work is back in `NoTransaction`.
//!
//! Transaction operations are serialized by an async gate, so sibling futures
//! sharing one unit of work observe them one at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use stocker_core::{CorrelationId, TenantId};
use tracing::instrument;

use crate::blocking;
use crate::cache::{CacheKey, RepositoryCache};
use crate::cancel::CancelSignal;
use crate::error::{SessionError, TransactionOp, UowError, UowResult};
use crate::repository::{PersistentEntity, ReadRepository, Repository, SessionRepository};
use crate::session::{SessionRef, SessionTransaction};
use crate::sink::{LifecycleEvent, LifecycleSink, TracingSink};
use crate::tenant::TenantProvider;

pub(crate) const DEFAULT_CONTEXT: &str = "default";

struct ActiveTransaction {
    handle: Box<dyn SessionTransaction>,
    correlation_id: CorrelationId,
}

pub struct UnitOfWork {
    context: String,
    session: SessionRef,
    cache: RepositoryCache,
    sink: Arc<dyn LifecycleSink>,
    tenant: Option<Arc<dyn TenantProvider>>,
    gate: tokio::sync::Mutex<()>,
    active: Mutex<Option<ActiveTransaction>>,
    last_correlation_id: Mutex<Option<CorrelationId>>,
    disposed: AtomicBool,
}

impl core::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("context", &self.context)
            .field("active_transaction", &self.has_active_transaction())
            .field("cached_repositories", &self.cache.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl UnitOfWork {
    /// Unit of work over `session`, reporting lifecycle events through `tracing`.
    pub fn new(context: impl Into<String>, session: SessionRef) -> Self {
        Self::from_parts(context.into(), session, Arc::new(TracingSink), None)
    }

    pub fn builder() -> UnitOfWorkBuilder {
        UnitOfWorkBuilder::default()
    }

    fn from_parts(
        context: String,
        session: SessionRef,
        sink: Arc<dyn LifecycleSink>,
        tenant: Option<Arc<dyn TenantProvider>>,
    ) -> Self {
        Self {
            context,
            session,
            cache: RepositoryCache::new(),
            sink,
            tenant,
            gate: tokio::sync::Mutex::new(()),
            active: Mutex::new(None),
            last_correlation_id: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Module name used in lifecycle events (e.g. `"cms"`).
    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn session(&self) -> &SessionRef {
        &self.session
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn has_active_transaction(&self) -> bool {
        self.active_slot().is_some()
    }

    /// Correlation id of the most recent begin attempt.
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        *lock(&self.last_correlation_id)
    }

    /// Tenant this unit of work acts for.
    pub fn tenant_id(&self) -> UowResult<TenantId> {
        self.ensure_live()?;
        self.tenant
            .as_ref()
            .and_then(|p| p.current_tenant())
            .ok_or(UowError::MissingTenant)
    }

    /// Flush every staged change. Returns the number of affected records.
    ///
    /// Lands inside the active transaction if there is one. On failure the
    /// drained changes are put back into the tracker.
    #[instrument(skip(self, cancel), fields(context = %self.context), err)]
    pub async fn save_changes(&self, cancel: &CancelSignal) -> UowResult<usize> {
        self.ensure_live()?;
        self.flush_pending(cancel).await
    }

    /// Like [`save_changes`](Self::save_changes), reporting whether anything was written.
    pub async fn save_entities(&self, cancel: &CancelSignal) -> UowResult<bool> {
        Ok(self.save_changes(cancel).await? > 0)
    }

    /// Synchronous [`save_changes`](Self::save_changes) without cancellation.
    pub fn save_changes_blocking(&self) -> UowResult<usize> {
        let cancel = CancelSignal::none();
        blocking::block_on(self.save_changes(&cancel))?
    }

    async fn flush_pending(&self, cancel: &CancelSignal) -> UowResult<usize> {
        let tracker = self.session.tracker();
        let changes = tracker.drain();
        if changes.is_empty() {
            return Ok(0);
        }

        match cancel.guard(self.session.flush(changes.clone())).await {
            Ok(affected) => Ok(affected),
            Err(err) => {
                tracker.restore(changes);
                Err(err)
            }
        }
    }

    pub async fn begin_transaction(&self, cancel: &CancelSignal) -> UowResult<()> {
        self.ensure_live()?;
        let _gate = self.gate.lock().await;
        self.ensure_live()?;

        let correlation_id = CorrelationId::new();
        *lock(&self.last_correlation_id) = Some(correlation_id);

        if self.has_active_transaction() {
            return Err(self.invalid_state(
                TransactionOp::Begin,
                "a transaction is already active",
                Some(correlation_id),
            ));
        }

        match cancel.guard(self.session.begin_transaction()).await {
            Ok(handle) => {
                *self.active_slot() = Some(ActiveTransaction {
                    handle,
                    correlation_id,
                });
                self.sink.record(&LifecycleEvent::TransactionStarted {
                    context: self.context.clone(),
                    correlation_id,
                });
                Ok(())
            }
            Err(err) => {
                self.record_failure(TransactionOp::Begin, correlation_id, &err);
                Err(err)
            }
        }
    }

    pub async fn commit_transaction(&self, cancel: &CancelSignal) -> UowResult<()> {
        self.ensure_live()?;
        let _gate = self.gate.lock().await;
        self.ensure_live()?;

        // Taken out of the slot up front: every exit below releases it.
        let Some(ActiveTransaction {
            mut handle,
            correlation_id,
        }) = self.take_active()
        else {
            return Err(self.invalid_state(
                TransactionOp::Commit,
                "no transaction is active",
                self.correlation_id(),
            ));
        };

        let outcome = match self.flush_pending(cancel).await {
            Ok(_) => cancel.guard(handle.commit()).await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => {
                self.sink.record(&LifecycleEvent::TransactionCommitted {
                    context: self.context.clone(),
                    correlation_id,
                });
                Ok(())
            }
            Err(err) => {
                self.record_failure(TransactionOp::Commit, correlation_id, &err);
                match self.rollback_handle(handle.as_mut(), correlation_id).await {
                    Ok(()) => Err(err),
                    Err(source) => Err(UowError::RollbackFailed {
                        original: Box::new(err),
                        source,
                    }),
                }
            }
        }
    }

    pub async fn rollback_transaction(&self, cancel: &CancelSignal) -> UowResult<()> {
        self.ensure_live()?;
        let _gate = self.gate.lock().await;
        self.ensure_live()?;

        let Some(ActiveTransaction {
            mut handle,
            correlation_id,
        }) = self.take_active()
        else {
            return Err(self.invalid_state(
                TransactionOp::Rollback,
                "no transaction is active",
                self.correlation_id(),
            ));
        };

        match cancel.guard(handle.rollback()).await {
            Ok(()) => {
                self.record_rolled_back(correlation_id);
                Ok(())
            }
            Err(err) => {
                self.record_failure(TransactionOp::Rollback, correlation_id, &err);
                Err(err)
            }
        }
    }

    /// Cleanup rollback after a failure; not cancellable.
    async fn rollback_handle(
        &self,
        handle: &mut dyn SessionTransaction,
        correlation_id: CorrelationId,
    ) -> Result<(), SessionError> {
        match handle.rollback().await {
            Ok(()) => {
                self.record_rolled_back(correlation_id);
                Ok(())
            }
            Err(err) => {
                self.sink.record(&LifecycleEvent::TransactionFailed {
                    context: self.context.clone(),
                    correlation_id,
                    operation: TransactionOp::Rollback,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Read/write repository for `T`, shared with [`read_repository`](Self::read_repository).
    pub fn repository<T: PersistentEntity>(&self) -> UowResult<Arc<dyn Repository<T>>> {
        let repo: Arc<dyn Repository<T>> = self.session_repository::<T>()?;
        Ok(repo)
    }

    pub fn read_repository<T: PersistentEntity>(&self) -> UowResult<Arc<dyn ReadRepository<T>>> {
        let repo: Arc<dyn ReadRepository<T>> = self.session_repository::<T>()?;
        Ok(repo)
    }

    fn session_repository<T: PersistentEntity>(&self) -> UowResult<Arc<SessionRepository<T>>> {
        self.ensure_live()?;
        self.cache
            .get_or_create(CacheKey::of::<SessionRepository<T>>(), || {
                SessionRepository::new(self.session.clone())
            })
    }

    /// Domain repository cached under the interface type `K`.
    ///
    /// `factory` runs at most once per unit of work for a given `K`.
    pub fn domain_repository<K, R, F>(&self, factory: F) -> UowResult<Arc<R>>
    where
        K: ?Sized + 'static,
        R: Send + Sync + 'static,
        F: FnOnce(SessionRef) -> R,
    {
        self.ensure_live()?;
        self.cache
            .get_or_create(CacheKey::of::<K>(), || factory(self.session.clone()))
    }

    /// Number of repositories constructed so far.
    pub fn cached_repositories(&self) -> usize {
        self.cache.len()
    }

    /// Release the session. Idempotent: only the first call does any work.
    ///
    /// An active transaction is reported and rolled back. A rollback failure
    /// does not stop the rest of the teardown; it is returned afterwards.
    pub async fn dispose(&self) -> UowResult<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _gate = self.gate.lock().await;

        let mut result = Ok(());
        if let Some(ActiveTransaction {
            mut handle,
            correlation_id,
        }) = self.take_active()
        {
            self.sink.record(&LifecycleEvent::DisposedWithActiveTransaction {
                context: self.context.clone(),
                correlation_id,
            });
            if let Err(err) = self.rollback_handle(handle.as_mut(), correlation_id).await {
                result = Err(UowError::Session(err));
            }
        }

        self.cache.clear();
        match self.session.close().await {
            Ok(()) | Err(SessionError::Closed) => {}
            Err(err) => {
                tracing::warn!(context = %self.context, error = %err, "failed to close session");
                if result.is_ok() {
                    result = Err(UowError::Session(err));
                }
            }
        }

        tracing::debug!(context = %self.context, "unit of work disposed");
        result
    }

    /// Synchronous [`dispose`](Self::dispose).
    pub fn dispose_blocking(&self) -> UowResult<()> {
        blocking::block_on(self.dispose())?
    }

    fn ensure_live(&self) -> UowResult<()> {
        if self.is_disposed() {
            Err(UowError::Disposed)
        } else {
            Ok(())
        }
    }

    fn active_slot(&self) -> MutexGuard<'_, Option<ActiveTransaction>> {
        lock(&self.active)
    }

    fn take_active(&self) -> Option<ActiveTransaction> {
        self.active_slot().take()
    }

    fn invalid_state(
        &self,
        operation: TransactionOp,
        reason: &'static str,
        correlation_id: Option<CorrelationId>,
    ) -> UowError {
        self.sink.record(&LifecycleEvent::InvalidState {
            context: self.context.clone(),
            correlation_id,
            operation,
            reason,
        });
        UowError::invalid_state(operation, reason, correlation_id)
    }

    fn record_failure(&self, operation: TransactionOp, correlation_id: CorrelationId, err: &UowError) {
        self.sink.record(&LifecycleEvent::TransactionFailed {
            context: self.context.clone(),
            correlation_id,
            operation,
            error: err.to_string(),
        });
    }

    fn record_rolled_back(&self, correlation_id: CorrelationId) {
        self.sink.record(&LifecycleEvent::TransactionRolledBack {
            context: self.context.clone(),
            correlation_id,
        });
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.is_disposed() {
            return;
        }
        if let Some(active) = self.take_active() {
            // Dropping the handle releases the transaction without committing.
            self.sink.record(&LifecycleEvent::DisposedWithActiveTransaction {
                context: self.context.clone(),
                correlation_id: active.correlation_id,
            });
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Slots are replaced whole, so a poisoned value is still consistent.
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

/// Builder for [`UnitOfWork`]. A session is required.
#[derive(Default)]
pub struct UnitOfWorkBuilder {
    context: Option<String>,
    session: Option<SessionRef>,
    sink: Option<Arc<dyn LifecycleSink>>,
    tenant: Option<Arc<dyn TenantProvider>>,
}

impl UnitOfWorkBuilder {
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn session(mut self, session: SessionRef) -> Self {
        self.session = Some(session);
        self
    }

    pub fn sink<S: LifecycleSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    pub fn tenant<P: TenantProvider + 'static>(mut self, provider: P) -> Self {
        self.tenant = Some(Arc::new(provider));
        self
    }

    pub fn build(self) -> UowResult<UnitOfWork> {
        let session = self.session.ok_or(UowError::MissingSession)?;
        Ok(UnitOfWork::from_parts(
            self.context.unwrap_or_else(|| DEFAULT_CONTEXT.to_string()),
            session,
            self.sink.unwrap_or_else(|| Arc::new(TracingSink)),
            self.tenant,
        ))
    }
}

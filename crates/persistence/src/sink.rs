//! Lifecycle event sink.
//!
//! The unit of work reports transaction lifecycle events (started, committed,
//! rolled back, failed, misuse, leaked at disposal) to a [`LifecycleSink`]
//! supplied by the caller. When none is configured the unit of work reports
//! through [`TracingSink`], which does nothing unless a subscriber is
//! installed; [`NoopSink`] silences events explicitly.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use stocker_core::CorrelationId;

use crate::error::TransactionOp;

/// Severity a sink should use for an event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A structured transaction lifecycle event.
///
/// Every variant carries the unit-of-work context name (e.g. `"cms"`) and,
/// where one exists, the correlation id of the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    TransactionStarted {
        context: String,
        correlation_id: CorrelationId,
    },
    TransactionCommitted {
        context: String,
        correlation_id: CorrelationId,
    },
    TransactionRolledBack {
        context: String,
        correlation_id: CorrelationId,
    },
    TransactionFailed {
        context: String,
        correlation_id: CorrelationId,
        operation: TransactionOp,
        error: String,
    },
    InvalidState {
        context: String,
        correlation_id: Option<CorrelationId>,
        operation: TransactionOp,
        reason: &'static str,
    },
    DisposedWithActiveTransaction {
        context: String,
        correlation_id: CorrelationId,
    },
}

impl LifecycleEvent {
    pub fn level(&self) -> EventLevel {
        match self {
            LifecycleEvent::TransactionStarted { .. } => EventLevel::Debug,
            LifecycleEvent::TransactionCommitted { .. } => EventLevel::Info,
            LifecycleEvent::TransactionRolledBack { .. } => EventLevel::Warn,
            LifecycleEvent::TransactionFailed { .. }
            | LifecycleEvent::InvalidState { .. }
            | LifecycleEvent::DisposedWithActiveTransaction { .. } => EventLevel::Error,
        }
    }

    pub fn context(&self) -> &str {
        match self {
            LifecycleEvent::TransactionStarted { context, .. }
            | LifecycleEvent::TransactionCommitted { context, .. }
            | LifecycleEvent::TransactionRolledBack { context, .. }
            | LifecycleEvent::TransactionFailed { context, .. }
            | LifecycleEvent::InvalidState { context, .. }
            | LifecycleEvent::DisposedWithActiveTransaction { context, .. } => context,
        }
    }

    pub fn correlation_id(&self) -> Option<CorrelationId> {
        match self {
            LifecycleEvent::TransactionStarted { correlation_id, .. }
            | LifecycleEvent::TransactionCommitted { correlation_id, .. }
            | LifecycleEvent::TransactionRolledBack { correlation_id, .. }
            | LifecycleEvent::TransactionFailed { correlation_id, .. }
            | LifecycleEvent::DisposedWithActiveTransaction { correlation_id, .. } => {
                Some(*correlation_id)
            }
            LifecycleEvent::InvalidState { correlation_id, .. } => *correlation_id,
        }
    }
}

/// Destination for lifecycle events.
pub trait LifecycleSink: Send + Sync {
    fn record(&self, event: &LifecycleEvent);
}

impl<S> LifecycleSink for Arc<S>
where
    S: LifecycleSink + ?Sized,
{
    fn record(&self, event: &LifecycleEvent) {
        (**self).record(event)
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl LifecycleSink for NoopSink {
    fn record(&self, _event: &LifecycleEvent) {}
}

/// Forwards events to `tracing` with structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LifecycleSink for TracingSink {
    fn record(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::TransactionStarted {
                context,
                correlation_id,
            } => {
                tracing::debug!(%correlation_id, context = %context, "transaction started");
            }
            LifecycleEvent::TransactionCommitted {
                context,
                correlation_id,
            } => {
                tracing::info!(%correlation_id, context = %context, "transaction committed");
            }
            LifecycleEvent::TransactionRolledBack {
                context,
                correlation_id,
            } => {
                tracing::warn!(%correlation_id, context = %context, "transaction rolled back");
            }
            LifecycleEvent::TransactionFailed {
                context,
                correlation_id,
                operation,
                error,
            } => {
                tracing::error!(
                    %correlation_id,
                    context = %context,
                    %operation,
                    error = %error,
                    "transaction {operation} failed"
                );
            }
            LifecycleEvent::InvalidState {
                context,
                correlation_id,
                operation,
                reason,
            } => {
                tracing::error!(
                    correlation_id = ?correlation_id,
                    context = %context,
                    %operation,
                    "cannot {operation} transaction: {reason}"
                );
            }
            LifecycleEvent::DisposedWithActiveTransaction {
                context,
                correlation_id,
            } => {
                tracing::error!(
                    %correlation_id,
                    context = %context,
                    "unit of work disposed with an uncommitted transaction; \
                     transactions must be committed or rolled back explicitly"
                );
            }
        }
    }
}

/// Collects events in memory (tests, diagnostics).
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Snapshot of recorded events in order.
    pub fn events(&self) -> Vec<LifecycleEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count_at(&self, level: EventLevel) -> usize {
        self.events().iter().filter(|e| e.level() == level).count()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl LifecycleSink for MemorySink {
    fn record(&self, event: &LifecycleEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

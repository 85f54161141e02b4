//! Error model for sessions and the unit of work.
//!
//! Two layers:
//!
//! - [`SessionError`]: failures raised by the underlying session or transaction
//!   handle (constraint violations, connectivity loss, closed session, ...).
//! - [`UowError`]: what callers of the unit of work see. Session failures are
//!   carried unchanged in [`UowError::Session`] once local cleanup ran.
//!
//! Nothing in this crate retries; retry policy belongs to the caller.

use stocker_core::CorrelationId;
use thiserror::Error;

/// Result type returned by unit-of-work operations.
pub type UowResult<T> = Result<T, UowError>;

/// Failure raised by a persistence session or its transaction handle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Storage-level failure (connectivity, SQL error, ...).
    #[error("database error: {0}")]
    Database(String),

    /// A write collided with existing data (e.g. unique violation).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A record expected to exist was missing.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Entity payload could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The session was already closed.
    #[error("session closed")]
    Closed,

    /// Failure injected by a test fault plan.
    #[error("injected failure: {0}")]
    Injected(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

impl From<serde_json::Error> for SessionError {
    fn from(value: serde_json::Error) -> Self {
        SessionError::Serialization(value.to_string())
    }
}

/// Transaction operation name, used in `InvalidState` errors and lifecycle events.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionOp {
    Begin,
    Commit,
    Rollback,
}

impl core::fmt::Display for TransactionOp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            TransactionOp::Begin => "begin",
            TransactionOp::Commit => "commit",
            TransactionOp::Rollback => "rollback",
        };
        f.write_str(s)
    }
}

/// Unit-of-work error surfaced to command/query handlers.
#[derive(Debug, Error)]
pub enum UowError {
    /// Any operation invoked after disposal.
    #[error("unit of work has been disposed")]
    Disposed,

    /// Begin while active, or commit/rollback while none is active.
    #[error("cannot {operation} transaction: {reason} (correlation_id: {})", display_correlation(.correlation_id))]
    InvalidState {
        operation: TransactionOp,
        reason: &'static str,
        correlation_id: Option<CorrelationId>,
    },

    /// Failure from the session or transaction handle, propagated unchanged.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Cleanup rollback failed after an earlier failure. Both errors are kept.
    #[error("rollback failed ({source}) while handling: {original}")]
    RollbackFailed {
        original: Box<UowError>,
        #[source]
        source: SessionError,
    },

    /// The caller's cancellation signal fired during a suspending operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The builder was finalized without a session.
    #[error("unit of work requires a persistence session")]
    MissingSession,

    /// No tenant context is available for this unit of work.
    #[error("no tenant context available")]
    MissingTenant,

    /// A blocking call could not obtain an async runtime to drive the operation.
    #[error("async runtime unavailable: {0}")]
    Runtime(String),

    /// A cache key was reused with a different repository type.
    #[error("repository cache entry `{key}` holds a different type")]
    CacheTypeMismatch { key: &'static str },
}

impl UowError {
    pub(crate) fn invalid_state(
        operation: TransactionOp,
        reason: &'static str,
        correlation_id: Option<CorrelationId>,
    ) -> Self {
        UowError::InvalidState {
            operation,
            reason,
            correlation_id,
        }
    }

    /// The session-level error behind this failure, if any.
    pub fn session_error(&self) -> Option<&SessionError> {
        match self {
            UowError::Session(e) => Some(e),
            UowError::RollbackFailed { original, .. } => original.session_error(),
            _ => None,
        }
    }
}

fn display_correlation(id: &Option<CorrelationId>) -> String {
    id.map(|id| id.to_string())
        .unwrap_or_else(|| "none".to_string())
}

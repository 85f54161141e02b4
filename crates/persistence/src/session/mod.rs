//! Persistence session boundary.
//!
//! A session wraps one physical connection (or an in-memory equivalent) for a
//! single unit of work. It owns a [`ChangeTracker`] where repositories stage
//! writes; the unit of work drains the tracker and hands the batch to
//! [`PersistenceSession::flush`] on save.
//!
//! Transactions are opened with [`PersistenceSession::begin_transaction`].
//! While the returned handle is alive, flushed changes land inside that
//! transaction. Dropping a handle without committing releases it and discards
//! its writes.

pub mod change_tracker;
pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::SessionError;

pub use change_tracker::ChangeTracker;
pub use in_memory::{FaultPlan, InMemorySession, InMemoryStore, SessionStats};
#[cfg(feature = "postgres")]
pub use postgres::PgSession;

/// Storage key of one entity record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub entity_type: String,
    pub entity_id: String,
}

impl RecordKey {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }
}

impl core::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

/// A staged write waiting for the next flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PendingChange {
    Upsert { key: RecordKey, payload: JsonValue },
    Delete { key: RecordKey },
}

impl PendingChange {
    pub fn key(&self) -> &RecordKey {
        match self {
            PendingChange::Upsert { key, .. } | PendingChange::Delete { key } => key,
        }
    }
}

/// Open transaction on a session.
///
/// The handle outlives a failed `commit` so the caller can still `rollback`.
/// Dropping the handle releases the transaction; anything not committed by
/// then is discarded.
#[async_trait::async_trait]
pub trait SessionTransaction: Send {
    async fn commit(&mut self) -> Result<(), SessionError>;

    /// Roll back. A no-op once the transaction has finished.
    async fn rollback(&mut self) -> Result<(), SessionError>;
}

/// One persistence session (connection + change tracker scope).
#[async_trait::async_trait]
pub trait PersistenceSession: Send + Sync {
    /// Staging area for repository writes.
    fn tracker(&self) -> &ChangeTracker;

    /// Load one record as visible to this session (including its open transaction).
    async fn fetch(&self, key: &RecordKey) -> Result<Option<JsonValue>, SessionError>;

    /// Load every record of one entity type, ordered by entity id.
    async fn fetch_all(&self, entity_type: &str) -> Result<Vec<(RecordKey, JsonValue)>, SessionError>;

    /// Write a batch of changes; returns the number of affected records.
    ///
    /// Lands in the open transaction if there is one, otherwise the batch is
    /// applied atomically on its own.
    async fn flush(&self, changes: Vec<PendingChange>) -> Result<usize, SessionError>;

    async fn begin_transaction(&self) -> Result<Box<dyn SessionTransaction>, SessionError>;

    /// Release the underlying connection. Further calls fail with `Closed`.
    async fn close(&self) -> Result<(), SessionError>;

    fn is_closed(&self) -> bool;
}

/// Shared, type-erased session handle as held by units of work and repositories.
pub type SessionRef = Arc<dyn PersistenceSession>;

//! Postgres-backed persistence session.
//!
//! Entities are stored as JSON documents in a single table keyed by
//! `(entity_type, entity_id)`. Schema mapping per entity is deliberately not
//! modeled here.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | SessionError |
//! |------------|----------------------|--------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | any other | `Database` |
//! | PoolClosed | N/A | `Closed` |
//! | Other | N/A | `Database` |
//!
//! ## Transactions
//!
//! The open `sqlx::Transaction` stays in a slot shared between the session and
//! its [`SessionTransaction`] handle, behind an async mutex held for the whole
//! statement. Concurrent statements on one session therefore queue on the
//! transaction instead of bypassing it.
//!
//! A statement future dropped mid-flight leaves the connection in an unknown
//! state, so the transaction is discarded (the server rolls it back) and the
//! slot is marked lost. From then on every statement fails until the handle is
//! committed (error) or rolled back; nothing falls back to autocommit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{instrument, warn};

use crate::error::SessionError;

use super::{ChangeTracker, PendingChange, PersistenceSession, RecordKey, SessionTransaction};

#[derive(Default)]
enum TxState {
    #[default]
    Idle,
    Open(Transaction<'static, Postgres>),
    /// A statement was interrupted; the transaction is gone.
    Lost,
}

#[derive(Default)]
struct TxSlot {
    state: Mutex<TxState>,
    /// Set when the handle is dropped while a statement holds the slot.
    abandoned: AtomicBool,
}

fn transaction_lost() -> SessionError {
    SessionError::Database("transaction was lost after an interrupted statement".to_string())
}

/// Exclusive use of the open transaction for one statement.
///
/// Dropped before [`finish`](Self::finish) means the statement future was
/// cancelled: the transaction is discarded and the slot marked lost.
struct Statement<'a> {
    slot: &'a TxSlot,
    guard: MutexGuard<'a, TxState>,
    completed: bool,
}

impl Statement<'_> {
    fn conn(&mut self) -> Result<&mut PgConnection, SessionError> {
        match &mut *self.guard {
            TxState::Open(tx) => Ok(&mut **tx),
            _ => Err(transaction_lost()),
        }
    }

    fn finish(mut self) {
        self.completed = true;
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        if self.slot.abandoned.swap(false, Ordering::SeqCst) {
            *self.guard = TxState::Idle;
        } else if !self.completed {
            warn!("statement interrupted inside a transaction; transaction discarded");
            *self.guard = TxState::Lost;
        }
    }
}

/// Create the record table if it does not exist.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), SessionError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entity_records (
            entity_type TEXT        NOT NULL,
            entity_id   TEXT        NOT NULL,
            payload     JSONB       NOT NULL,
            updated_at  TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (entity_type, entity_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    Ok(())
}

/// Persistence session over a shared `PgPool`.
///
/// One session per unit of work; the pool is shared.
pub struct PgSession {
    pool: PgPool,
    tracker: ChangeTracker,
    slot: Arc<TxSlot>,
    closed: AtomicBool,
}

enum Route<'a> {
    Transaction(Statement<'a>),
    Pool,
}

impl PgSession {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            tracker: ChangeTracker::new(),
            slot: Arc::new(TxSlot::default()),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    /// Where the next statement runs: inside the open transaction, or on the pool.
    async fn route(&self) -> Result<Route<'_>, SessionError> {
        let guard = self.slot.state.lock().await;
        match &*guard {
            TxState::Idle => return Ok(Route::Pool),
            TxState::Lost => return Err(transaction_lost()),
            TxState::Open(_) => {}
        }
        Ok(Route::Transaction(Statement {
            slot: &self.slot,
            guard,
            completed: false,
        }))
    }
}

async fn fetch_one(conn: &mut PgConnection, key: &RecordKey) -> Result<Option<JsonValue>, SessionError> {
    let row = sqlx::query(
        "SELECT payload FROM entity_records WHERE entity_type = $1 AND entity_id = $2",
    )
    .bind(&key.entity_type)
    .bind(&key.entity_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| map_sqlx_error("fetch", e))?;

    row.map(|r| r.try_get::<JsonValue, _>("payload"))
        .transpose()
        .map_err(|e| map_sqlx_error("fetch", e))
}

async fn fetch_type(
    conn: &mut PgConnection,
    entity_type: &str,
) -> Result<Vec<(RecordKey, JsonValue)>, SessionError> {
    let rows = sqlx::query(
        r#"
        SELECT entity_id, payload
        FROM entity_records
        WHERE entity_type = $1
        ORDER BY entity_id ASC
        "#,
    )
    .bind(entity_type)
    .fetch_all(conn)
    .await
    .map_err(|e| map_sqlx_error("fetch_all", e))?;

    rows.into_iter()
        .map(|row| {
            let id: String = row.try_get("entity_id")?;
            let payload: JsonValue = row.try_get("payload")?;
            Ok((RecordKey::new(entity_type, id), payload))
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .map_err(|e| map_sqlx_error("fetch_all", e))
}

async fn apply_changes(conn: &mut PgConnection, changes: Vec<PendingChange>) -> Result<usize, SessionError> {
    let mut affected = 0u64;
    for change in changes {
        let result = match change {
            PendingChange::Upsert { key, payload } => sqlx::query(
                r#"
                INSERT INTO entity_records (entity_type, entity_id, payload, updated_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (entity_type, entity_id)
                DO UPDATE SET payload = EXCLUDED.payload, updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(&key.entity_type)
            .bind(&key.entity_id)
            .bind(&payload)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("upsert", e))?,
            PendingChange::Delete { key } => sqlx::query(
                "DELETE FROM entity_records WHERE entity_type = $1 AND entity_id = $2",
            )
            .bind(&key.entity_type)
            .bind(&key.entity_id)
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?,
        };
        affected += result.rows_affected();
    }
    Ok(affected as usize)
}

#[async_trait::async_trait]
impl PersistenceSession for PgSession {
    fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    #[instrument(skip(self), fields(record = %key), err)]
    async fn fetch(&self, key: &RecordKey) -> Result<Option<JsonValue>, SessionError> {
        self.ensure_open()?;

        match self.route().await? {
            Route::Transaction(mut stmt) => {
                let res = fetch_one(stmt.conn()?, key).await;
                stmt.finish();
                res
            }
            Route::Pool => {
                let mut conn = self
                    .pool
                    .acquire()
                    .await
                    .map_err(|e| map_sqlx_error("acquire", e))?;
                fetch_one(&mut conn, key).await
            }
        }
    }

    #[instrument(skip(self), err)]
    async fn fetch_all(&self, entity_type: &str) -> Result<Vec<(RecordKey, JsonValue)>, SessionError> {
        self.ensure_open()?;

        match self.route().await? {
            Route::Transaction(mut stmt) => {
                let res = fetch_type(stmt.conn()?, entity_type).await;
                stmt.finish();
                res
            }
            Route::Pool => {
                let mut conn = self
                    .pool
                    .acquire()
                    .await
                    .map_err(|e| map_sqlx_error("acquire", e))?;
                fetch_type(&mut conn, entity_type).await
            }
        }
    }

    #[instrument(skip(self, changes), fields(changes = changes.len()), err)]
    async fn flush(&self, changes: Vec<PendingChange>) -> Result<usize, SessionError> {
        self.ensure_open()?;
        if changes.is_empty() {
            return Ok(0);
        }

        match self.route().await? {
            Route::Transaction(mut stmt) => {
                let res = apply_changes(stmt.conn()?, changes).await;
                stmt.finish();
                res
            }
            Route::Pool => {
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| map_sqlx_error("begin_flush", e))?;
                let affected = apply_changes(&mut tx, changes).await?;
                tx.commit()
                    .await
                    .map_err(|e| map_sqlx_error("commit_flush", e))?;
                Ok(affected)
            }
        }
    }

    #[instrument(skip(self), err)]
    async fn begin_transaction(&self) -> Result<Box<dyn SessionTransaction>, SessionError> {
        self.ensure_open()?;
        let mut state = self.slot.state.lock().await;
        if !matches!(*state, TxState::Idle) {
            return Err(SessionError::Database(
                "session already has an open transaction".to_string(),
            ));
        }

        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        self.slot.abandoned.store(false, Ordering::SeqCst);
        *state = TxState::Open(tx);

        Ok(Box::new(PgTransaction {
            slot: self.slot.clone(),
            finished: false,
        }))
    }

    async fn close(&self) -> Result<(), SessionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        // Dropping an open sqlx transaction rolls it back.
        *self.slot.state.lock().await = TxState::Idle;
        self.tracker.clear();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct PgTransaction {
    slot: Arc<TxSlot>,
    finished: bool,
}

impl PgTransaction {
    async fn take(&mut self) -> TxState {
        self.finished = true;
        std::mem::take(&mut *self.slot.state.lock().await)
    }
}

#[async_trait::async_trait]
impl SessionTransaction for PgTransaction {
    async fn commit(&mut self) -> Result<(), SessionError> {
        match self.take().await {
            TxState::Open(tx) => tx
                .commit()
                .await
                .map_err(|e| map_sqlx_error("commit_transaction", e)),
            TxState::Lost => Err(transaction_lost()),
            TxState::Idle => Err(SessionError::Database(
                "transaction is no longer open".to_string(),
            )),
        }
    }

    /// A lost transaction was already rolled back by the server.
    async fn rollback(&mut self) -> Result<(), SessionError> {
        match self.take().await {
            TxState::Open(tx) => tx
                .rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback_transaction", e)),
            TxState::Lost | TxState::Idle => Ok(()),
        }
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        match self.slot.state.try_lock() {
            Ok(mut state) => *state = TxState::Idle,
            // A statement holds the slot; it clears it when it ends.
            Err(_) => self.slot.abandoned.store(true, Ordering::SeqCst),
        }
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> SessionError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => SessionError::Conflict(msg),
                _ => SessionError::Database(msg),
            }
        }
        sqlx::Error::PoolClosed => SessionError::Closed,
        _ => SessionError::Database(format!("sqlx error in {}: {}", operation, err)),
    }
}

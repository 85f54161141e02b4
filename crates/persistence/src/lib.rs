//! Per-module unit of work over a persistence session.
//!
//! - [`session`]: the persistence session boundary (in-memory and Postgres).
//! - [`repository`]: repository traits and the generic session-backed repository.
//! - [`cache`]: per-unit-of-work repository cache.
//! - [`uow`]: the transactional unit of work.
//! - [`sink`]: lifecycle event reporting.

mod blocking;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
mod macros;
pub mod repository;
pub mod session;
pub mod sink;
pub mod tenant;
pub mod uow;

pub use cache::{CacheKey, RepositoryCache};
pub use cancel::CancelSignal;
pub use config::{Backend, ConfigError, PersistenceConfig, SessionFactory};
pub use error::{SessionError, TransactionOp, UowError, UowResult};
pub use repository::{PersistentEntity, ReadRepository, Repository, SessionBacked, SessionRepository};
pub use session::{PersistenceSession, SessionRef, SessionTransaction};
pub use sink::{EventLevel, LifecycleEvent, LifecycleSink, MemorySink, NoopSink, TracingSink};
pub use tenant::{StaticTenant, TenantProvider};
pub use uow::{UnitOfWork, UnitOfWorkBuilder};

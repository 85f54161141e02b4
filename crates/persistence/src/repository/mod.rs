//! Repository boundary.
//!
//! Repositories are collection-like views over one entity type. Writes are
//! staged in the session's change tracker and only reach storage when the
//! unit of work saves; reads see staged writes immediately.

pub mod session_repository;
pub mod r#trait;

pub use r#trait::{PersistentEntity, ReadRepository, Repository, SessionBacked, record_key};
pub use session_repository::SessionRepository;

//! `stocker-core`: shared building blocks for every Stocker module.
//!
//! Identifiers, the entity contract and the domain error model. No IO lives
//! here; persistence concerns belong to `stocker-persistence`.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{CorrelationId, EntityId, TenantId};

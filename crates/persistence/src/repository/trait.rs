use serde::Serialize;
use serde::de::DeserializeOwned;

use stocker_core::Entity;

use crate::error::SessionError;
use crate::session::RecordKey;

use super::SessionRepository;

/// An entity that can be stored through a persistence session.
///
/// `ENTITY_TYPE` is the stable storage name of the type; changing it orphans
/// existing records.
pub trait PersistentEntity:
    Entity<Id: Send + Sync> + Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
    const ENTITY_TYPE: &'static str;
}

/// Storage key for an entity id.
pub fn record_key<T: PersistentEntity>(id: &T::Id) -> RecordKey {
    RecordKey::new(T::ENTITY_TYPE, id.to_string())
}

/// Read-only capability over one entity type.
#[async_trait::async_trait]
pub trait ReadRepository<T: PersistentEntity>: Send + Sync {
    async fn get(&self, id: &T::Id) -> Result<Option<T>, SessionError>;

    /// All entities, ordered by id.
    async fn list(&self) -> Result<Vec<T>, SessionError>;

    async fn exists(&self, id: &T::Id) -> Result<bool, SessionError> {
        Ok(self.get(id).await?.is_some())
    }

    async fn count(&self) -> Result<usize, SessionError> {
        Ok(self.list().await?.len())
    }

    /// Entities matching `predicate`, ordered by id.
    async fn find(
        &self,
        predicate: &(dyn for<'a> Fn(&'a T) -> bool + Send + Sync),
    ) -> Result<Vec<T>, SessionError> {
        Ok(self.list().await?.into_iter().filter(|e| predicate(e)).collect())
    }
}

/// Read/write capability over one entity type.
///
/// Writes are staged; they become durable when the owning unit of work saves.
#[async_trait::async_trait]
pub trait Repository<T: PersistentEntity>: ReadRepository<T> {
    /// Stage a new entity. Fails with `Conflict` if the id is already taken.
    async fn add(&self, entity: T) -> Result<(), SessionError>;

    /// Stage a replacement. Fails with `NotFound` if the entity does not exist.
    async fn update(&self, entity: T) -> Result<(), SessionError>;

    /// Stage a removal. Fails with `NotFound` if the entity does not exist.
    async fn remove(&self, id: &T::Id) -> Result<(), SessionError>;
}

/// A type whose storage is a [`SessionRepository`].
///
/// Implementors get [`ReadRepository`] and [`Repository`] through blanket
/// impls and only add their domain queries on top.
pub trait SessionBacked<T: PersistentEntity>: Send + Sync {
    fn backing(&self) -> &SessionRepository<T>;
}

use std::collections::BTreeMap;
use std::marker::PhantomData;

use serde_json::Value as JsonValue;
use tracing::instrument;

use crate::error::SessionError;
use crate::session::{PendingChange, SessionRef};

use super::r#trait::{PersistentEntity, ReadRepository, Repository, SessionBacked, record_key};

/// Generic repository over a persistence session.
///
/// Reads merge the session's stored records with changes staged in its
/// tracker, so an entity added in this unit of work is visible before save.
pub struct SessionRepository<T> {
    session: SessionRef,
    _entity: PhantomData<fn() -> T>,
}

impl<T: PersistentEntity> SessionRepository<T> {
    pub fn new(session: SessionRef) -> Self {
        Self {
            session,
            _entity: PhantomData,
        }
    }

    pub fn session(&self) -> &SessionRef {
        &self.session
    }

    fn decode(payload: JsonValue) -> Result<T, SessionError> {
        Ok(serde_json::from_value(payload)?)
    }

    async fn load(&self, id: &T::Id) -> Result<Option<T>, SessionError> {
        let key = record_key::<T>(id);
        match self.session.tracker().get(&key) {
            Some(PendingChange::Upsert { payload, .. }) => Self::decode(payload).map(Some),
            Some(PendingChange::Delete { .. }) => Ok(None),
            None => self.session.fetch(&key).await?.map(Self::decode).transpose(),
        }
    }

    async fn load_all(&self) -> Result<Vec<T>, SessionError> {
        let mut records: BTreeMap<String, JsonValue> = self
            .session
            .fetch_all(T::ENTITY_TYPE)
            .await?
            .into_iter()
            .map(|(key, payload)| (key.entity_id, payload))
            .collect();

        for change in self.session.tracker().pending_for(T::ENTITY_TYPE) {
            match change {
                PendingChange::Upsert { key, payload } => {
                    records.insert(key.entity_id, payload);
                }
                PendingChange::Delete { key } => {
                    records.remove(&key.entity_id);
                }
            }
        }

        records.into_values().map(Self::decode).collect()
    }

    #[instrument(skip(self, entity), fields(entity_type = T::ENTITY_TYPE, id = %entity.id()), err)]
    async fn insert(&self, entity: T) -> Result<(), SessionError> {
        if self.load(entity.id()).await?.is_some() {
            return Err(SessionError::Conflict(format!(
                "{} already exists",
                record_key::<T>(entity.id())
            )));
        }
        self.stage_upsert(&entity)
    }

    #[instrument(skip(self, entity), fields(entity_type = T::ENTITY_TYPE, id = %entity.id()), err)]
    async fn replace(&self, entity: T) -> Result<(), SessionError> {
        if self.load(entity.id()).await?.is_none() {
            return Err(SessionError::NotFound(record_key::<T>(entity.id()).to_string()));
        }
        self.stage_upsert(&entity)
    }

    #[instrument(skip(self), fields(entity_type = T::ENTITY_TYPE), err)]
    async fn delete(&self, id: &T::Id) -> Result<(), SessionError> {
        let key = record_key::<T>(id);
        if self.load(id).await?.is_none() {
            return Err(SessionError::NotFound(key.to_string()));
        }
        self.session.tracker().stage(PendingChange::Delete { key });
        Ok(())
    }

    fn stage_upsert(&self, entity: &T) -> Result<(), SessionError> {
        let payload = serde_json::to_value(entity)?;
        self.session.tracker().stage(PendingChange::Upsert {
            key: record_key::<T>(entity.id()),
            payload,
        });
        Ok(())
    }
}

impl<T> Clone for SessionRepository<T> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T> core::fmt::Debug for SessionRepository<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionRepository")
            .field("entity", &core::any::type_name::<T>())
            .finish()
    }
}

impl<T: PersistentEntity> SessionBacked<T> for SessionRepository<T> {
    fn backing(&self) -> &SessionRepository<T> {
        self
    }
}

#[async_trait::async_trait]
impl<T, B> ReadRepository<T> for B
where
    T: PersistentEntity,
    B: SessionBacked<T>,
{
    async fn get(&self, id: &T::Id) -> Result<Option<T>, SessionError> {
        self.backing().load(id).await
    }

    async fn list(&self) -> Result<Vec<T>, SessionError> {
        self.backing().load_all().await
    }
}

#[async_trait::async_trait]
impl<T, B> Repository<T> for B
where
    T: PersistentEntity,
    B: SessionBacked<T>,
{
    async fn add(&self, entity: T) -> Result<(), SessionError> {
        self.backing().insert(entity).await
    }

    async fn update(&self, entity: T) -> Result<(), SessionError> {
        self.backing().replace(entity).await
    }

    async fn remove(&self, id: &T::Id) -> Result<(), SessionError> {
        self.backing().delete(id).await
    }
}

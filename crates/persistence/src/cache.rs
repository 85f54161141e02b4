//! Per-unit-of-work repository cache.
//!
//! Maps a type key to exactly one live repository instance. Construction is
//! atomic: under concurrent first access the factory runs once and every
//! caller receives the same `Arc`.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{UowError, UowResult};

type CachedValue = Arc<dyn Any + Send + Sync>;

/// Cache key: a type identity plus its name for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct CacheKey {
    id: TypeId,
    name: &'static str,
}

impl CacheKey {
    pub fn of<K: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<K>(),
            name: core::any::type_name::<K>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CacheKey {}

impl core::hash::Hash for CacheKey {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[derive(Debug, Default)]
pub struct RepositoryCache {
    entries: RwLock<HashMap<CacheKey, CachedValue>>,
}

impl RepositoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    // Entries are only ever inserted whole, so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<CacheKey, CachedValue>> {
        self.entries.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<CacheKey, CachedValue>> {
        self.entries.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Return the entry for `key`, constructing it with `factory` if absent.
    ///
    /// `factory` runs under the cache's write lock and must not touch this
    /// cache itself.
    pub fn get_or_create<R, F>(&self, key: CacheKey, factory: F) -> UowResult<Arc<R>>
    where
        R: Send + Sync + 'static,
        F: FnOnce() -> R,
    {
        if let Some(existing) = self.read().get(&key) {
            return downcast(key, existing.clone());
        }

        let value = match self.write().entry(key) {
            Entry::Occupied(slot) => slot.get().clone(),
            Entry::Vacant(slot) => {
                let created: CachedValue = Arc::new(factory());
                tracing::trace!(repository = key.name(), "repository created");
                slot.insert(created).clone()
            }
        };
        downcast(key, value)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop every cached repository.
    pub fn clear(&self) {
        self.write().clear();
    }
}

fn downcast<R: Send + Sync + 'static>(key: CacheKey, value: CachedValue) -> UowResult<Arc<R>> {
    value
        .downcast::<R>()
        .map_err(|_| UowError::CacheTypeMismatch { key: key.name() })
}

use std::{
    collections::{
        HashMap,
        hash_map::Entry,
    },
    fmt::Debug,
    hash::Hash,
    sync::Arc,
};

use parking_lot::RwLock;

/// Insert-only cache that can be shared between threads.
///
/// Lookups only take a read lock. On a miss the value is built without holding
/// any lock and then inserted under the write lock. If another thread inserted
/// the same key in the meantime, its value wins and is returned to both
/// callers, so every caller observes the same [`Arc`] for a key.
pub struct SharedCache<K, V> {
    hash_map: RwLock<HashMap<K, Arc<V>>>,
}

impl<K, V> Default for SharedCache<K, V> {
    fn default() -> Self {
        Self {
            hash_map: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Debug for SharedCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCache")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<K, V> SharedCache<K, V>
where
    K: Eq + Hash,
{
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.hash_map.read().get(key).cloned()
    }

    pub fn get_or_insert_with(&self, key: K, init: impl FnOnce() -> V) -> Arc<V> {
        match self.get_or_try_insert_with(key, || Ok::<V, std::convert::Infallible>(init())) {
            Ok(value) => value,
            Err(infallible) => match infallible {},
        }
    }

    pub fn get_or_try_insert_with<E>(
        &self,
        key: K,
        init: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let value = Arc::new(init()?);

        let mut hash_map = self.hash_map.write();
        match hash_map.entry(key) {
            Entry::Occupied(occupied_entry) => Ok(occupied_entry.get().clone()),
            Entry::Vacant(vacant_entry) => Ok(vacant_entry.insert(value).clone()),
        }
    }
}

impl<K, V> SharedCache<K, V> {
    pub fn len(&self) -> usize {
        self.hash_map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hash_map.read().is_empty()
    }
}

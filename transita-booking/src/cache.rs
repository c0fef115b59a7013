use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Session-lifetime entity cache keyed by id. No TTL: entries live until
/// explicitly invalidated (inventory writes) or the session tears down.
pub struct EntityCache<T> {
    entries: RwLock<HashMap<Uuid, Arc<T>>>,
}

impl<T: Send + Sync> EntityCache<T> {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<T>> {
        self.entries.read().await.get(&id).cloned()
    }

    pub async fn insert(&self, id: Uuid, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.entries.write().await.insert(id, value.clone());
        value
    }

    /// Drop one entry, typically because its underlying record was mutated.
    pub async fn invalidate(&self, id: Uuid) {
        self.entries.write().await.remove(&id);
    }

    /// Teardown-on-unsubscribe: drop everything.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl<T: Send + Sync> Default for EntityCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_after_insert_hits() {
        let cache = EntityCache::new();
        let id = Uuid::new_v4();
        cache.insert(id, "entity".to_string()).await;
        assert_eq!(cache.get(id).await.as_deref().map(String::as_str), Some("entity"));
    }

    #[tokio::test]
    async fn invalidate_evicts_only_the_target() {
        let cache = EntityCache::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        cache.insert(a, 1u32).await;
        cache.insert(b, 2u32).await;
        cache.invalidate(a).await;
        assert!(cache.get(a).await.is_none());
        assert!(cache.get(b).await.is_some());
    }

    #[tokio::test]
    async fn clear_empties_the_session() {
        let cache = EntityCache::new();
        cache.insert(Uuid::new_v4(), 1u32).await;
        cache.insert(Uuid::new_v4(), 2u32).await;
        cache.clear().await;
        assert_eq!(cache.len().await, 0);
    }
}

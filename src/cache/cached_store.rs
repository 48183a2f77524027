//! Memory store fronted by a cache.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::ttl::{get_or_load, CacheKey, MemoryCache};
use crate::error::Result;
use crate::memory::{
    EntityKey, MemoryEntry, MemoryFilter, MemoryId, MemoryStore, MemoryUpdate, NewMemory,
};

/// Couples a store with a cache. Reads go through the cache; every write
/// invalidates the written entity's keys before returning, so a read issued
/// after a write completes never sees the pre-write result. A read that was
/// already loading when the write landed returns its rows without caching
/// them.
#[derive(Clone)]
pub struct CachedMemoryStore {
    store: Arc<dyn MemoryStore>,
    cache: Arc<dyn MemoryCache>,
}

impl CachedMemoryStore {
    pub fn new(store: Arc<dyn MemoryStore>, cache: Arc<dyn MemoryCache>) -> Self {
        Self { store, cache }
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<dyn MemoryCache> {
        &self.cache
    }

    pub async fn create_entry(&self, new: NewMemory) -> Result<MemoryEntry> {
        let entry = self.store.create_entry(new)?;
        self.invalidate_entity(&entry.key()).await;
        Ok(entry)
    }

    pub async fn batch_create_entries(&self, batch: Vec<NewMemory>) -> Result<Vec<MemoryEntry>> {
        let entries = self.store.batch_create_entries(batch)?;
        let keys: BTreeSet<EntityKey> = entries.iter().map(MemoryEntry::key).collect();
        for key in &keys {
            self.invalidate_entity(key).await;
        }
        Ok(entries)
    }

    pub async fn update_entry(&self, id: &MemoryId, update: &MemoryUpdate) -> Result<MemoryEntry> {
        let entry = self.store.update_entry(id, update)?;
        self.invalidate_entity(&entry.key()).await;
        Ok(entry)
    }

    pub async fn query(&self, key: &EntityKey, filter: &MemoryFilter) -> Result<Vec<MemoryEntry>> {
        let cache_key = CacheKey::new(key, filter);
        let scope = CacheKey::entity_pattern(key);
        get_or_load(self.cache.as_ref(), cache_key, &scope, || {
            self.store.query(key, filter)
        })
        .await
    }

    pub fn get_entry(&self, id: &MemoryId) -> Result<Option<MemoryEntry>> {
        self.store.get_entry(id)
    }

    pub fn current_entry(&self, key: &EntityKey) -> Result<Option<MemoryEntry>> {
        self.store.current_entry(key)
    }

    pub fn history(&self, key: &EntityKey) -> Result<Vec<MemoryEntry>> {
        self.store.history(key)
    }

    async fn invalidate_entity(&self, key: &EntityKey) {
        self.cache
            .invalidate(Some(&CacheKey::entity_pattern(key)))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlMemoryCache;
    use crate::memory::{EntityType, MemoryKind, SqliteMemoryStore};
    use pretty_assertions::assert_eq;

    fn cached() -> CachedMemoryStore {
        CachedMemoryStore::new(
            Arc::new(SqliteMemoryStore::in_memory().unwrap()),
            Arc::new(TtlMemoryCache::new()),
        )
    }

    #[tokio::test]
    async fn test_supersede_then_query_current() {
        let memories = cached();
        let key = EntityKey::new(EntityType::Character, "c1");
        let filter = MemoryFilter::new().current_only();

        memories
            .create_entry(
                NewMemory::new(EntityType::Character, "c1", "Loves sunsets").with_tags(["nature"]),
            )
            .await
            .unwrap();
        let before = memories.query(&key, &filter).await.unwrap();
        assert_eq!(before[0].text, "Loves sunsets");

        memories
            .create_entry(
                NewMemory::new(EntityType::Character, "c1", "Fears the dark")
                    .with_kind(MemoryKind::Soft)
                    .with_tags(["fear"]),
            )
            .await
            .unwrap();

        // Still inside the TTL window, but the write invalidated the entry
        let after = memories.query(&key, &filter).await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].version, 2);
        assert_eq!(after[0].text, "Fears the dark");
        assert!(after[0].is_current);
    }

    #[tokio::test]
    async fn test_repeated_queries_are_identical() {
        let memories = cached();
        let key = EntityKey::new(EntityType::World, "w1");
        memories
            .batch_create_entries(vec![
                NewMemory::new(EntityType::World, "w1", "a").with_relevance(0.3),
                NewMemory::new(EntityType::World, "w1", "b").with_relevance(0.8),
            ])
            .await
            .unwrap();

        let first = memories.query(&key, &MemoryFilter::new()).await.unwrap();
        let second = memories.query(&key, &MemoryFilter::new()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(memories.cache().stats().await.hits, 1);
    }

    #[tokio::test]
    async fn test_update_invalidates_entity() {
        let memories = cached();
        let key = EntityKey::new(EntityType::Character, "c1");
        let entry = memories
            .create_entry(NewMemory::new(EntityType::Character, "c1", "Quiet"))
            .await
            .unwrap();

        let recent = MemoryFilter::new().used_recently(true);
        assert!(memories.query(&key, &recent).await.unwrap().is_empty());

        memories
            .update_entry(&entry.id, &MemoryUpdate::new().used_recently(true))
            .await
            .unwrap();

        assert_eq!(memories.query(&key, &recent).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unfiltered_query_after_supersede_returns_history() {
        let memories = cached();
        let key = EntityKey::new(EntityType::Character, "c1");

        memories
            .create_entry(NewMemory::new(EntityType::Character, "c1", "Loves sunsets"))
            .await
            .unwrap();
        assert_eq!(memories.query(&key, &MemoryFilter::new()).await.unwrap().len(), 1);

        memories
            .create_entry(
                NewMemory::new(EntityType::Character, "c1", "Fears the dark")
                    .with_kind(MemoryKind::Soft),
            )
            .await
            .unwrap();

        let all = memories.query(&key, &MemoryFilter::new()).await.unwrap();
        let summary: Vec<(&str, u32, bool)> = all
            .iter()
            .map(|e| (e.text.as_str(), e.version, e.is_current))
            .collect();
        assert_eq!(
            summary,
            vec![("Fears the dark", 2, true), ("Loves sunsets", 1, false)]
        );
    }

    #[tokio::test]
    async fn test_stale_load_is_not_cached_after_write() {
        let memories = cached();
        let key = EntityKey::new(EntityType::Character, "c1");
        let filter = MemoryFilter::new().current_only();
        let scope = CacheKey::entity_pattern(&key);

        memories
            .create_entry(NewMemory::new(EntityType::Character, "c1", "old"))
            .await
            .unwrap();

        // A reader starts loading, then a write completes before it caches
        let generation = memories.cache().generation(&scope).await;
        let stale = memories.store().query(&key, &filter).unwrap();
        memories
            .create_entry(NewMemory::new(EntityType::Character, "c1", "new"))
            .await
            .unwrap();
        let stored = memories
            .cache()
            .set_if_current(CacheKey::new(&key, &filter), stale, &scope, generation)
            .await;
        assert!(!stored);

        let after = memories.query(&key, &filter).await.unwrap();
        assert_eq!(after[0].text, "new");
        assert_eq!(after[0].version, 2);
    }
}

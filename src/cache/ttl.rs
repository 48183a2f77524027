//! TTL read-through cache for memory queries.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::memory::{EntityKey, MemoryEntry, MemoryFilter};

/// Default time-to-live for cached query results.
pub const DEFAULT_TTL_SECS: i64 = 300;

/// Cache key for one (entity, filter) query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(pub String);

impl CacheKey {
    /// Build the key for a query. The filter contributes a hash so that
    /// equivalent filters share an entry.
    pub fn new(entity: &EntityKey, filter: &MemoryFilter) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(filter.fingerprint().as_bytes());
        let hash = hasher.finalize();
        CacheKey(format!(
            "memories:{}{:x}",
            Self::entity_pattern(entity),
            hash
        ))
    }

    /// Substring shared by every key of one entity. The trailing separator
    /// keeps `c1` from matching `c10`.
    pub fn entity_pattern(entity: &EntityKey) -> String {
        format!("{}:{}:", entity.entity_type, entity.entity_id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cached query result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Vec<MemoryEntry>,
    pub inserted_at: DateTime<Utc>,
    pub ttl: Duration,
    pub hit_count: u64,
}

impl CacheEntry {
    pub fn new(payload: Vec<MemoryEntry>, ttl: Duration) -> Self {
        Self {
            payload,
            inserted_at: Utc::now(),
            ttl,
            hit_count: 0,
        }
    }

    /// Check if entry is expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() - self.inserted_at >= self.ttl
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate hit rate.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Cache interface so a shared/distributed cache can replace the local one.
#[async_trait]
pub trait MemoryCache: Send + Sync {
    /// Cached payload, or `None` on miss or expiry.
    async fn get(&self, key: &CacheKey) -> Option<Vec<MemoryEntry>>;

    async fn set(&self, key: CacheKey, payload: Vec<MemoryEntry>);

    /// Invalidation counter for `scope`. It advances whenever an
    /// invalidation covers the scope.
    async fn generation(&self, scope: &str) -> u64;

    /// Store `payload` only if `scope` has not been invalidated since
    /// `generation` was read. Returns whether the payload was stored.
    async fn set_if_current(
        &self,
        key: CacheKey,
        payload: Vec<MemoryEntry>,
        scope: &str,
        generation: u64,
    ) -> bool;

    /// Drop entries whose key contains `pattern`; `None` clears everything.
    async fn invalidate(&self, pattern: Option<&str>);

    async fn stats(&self) -> CacheStats;
}

/// Read-through helper: return the cached payload or run `loader` and cache
/// its result. Loader errors are returned and nothing is cached.
///
/// The scope's generation is read before the loader runs, so a result loaded
/// across an invalidation of `scope` is returned but never cached.
pub async fn get_or_load<C, F>(
    cache: &C,
    key: CacheKey,
    scope: &str,
    loader: F,
) -> Result<Vec<MemoryEntry>>
where
    C: MemoryCache + ?Sized,
    F: FnOnce() -> Result<Vec<MemoryEntry>> + Send,
{
    if let Some(payload) = cache.get(&key).await {
        return Ok(payload);
    }
    let generation = cache.generation(scope).await;
    let payload = loader()?;
    if !cache
        .set_if_current(key, payload.clone(), scope, generation)
        .await
    {
        debug!(scope, "Discarded result loaded across an invalidation");
    }
    Ok(payload)
}

/// Invalidation counters. Both only grow, so their sum changes whenever
/// either one does.
#[derive(Debug, Default)]
struct Generations {
    /// Bumped by `invalidate(None)`
    epoch: u64,
    scopes: HashMap<String, u64>,
}

impl Generations {
    fn current(&self, scope: &str) -> u64 {
        self.epoch + self.scopes.get(scope).copied().unwrap_or(0)
    }

    fn bump(&mut self, pattern: Option<&str>) {
        match pattern {
            Some(p) => {
                for (scope, generation) in self.scopes.iter_mut() {
                    if scope.contains(p) {
                        *generation += 1;
                    }
                }
            }
            None => self.epoch += 1,
        }
    }
}

/// In-process TTL cache. Expiry is evaluated lazily when an entry is read.
#[derive(Clone)]
pub struct TtlMemoryCache {
    entries: Arc<RwLock<HashMap<CacheKey, CacheEntry>>>,
    generations: Arc<RwLock<Generations>>,
    stats: Arc<RwLock<CacheStats>>,
    ttl: Duration,
}

impl TtlMemoryCache {
    /// Create a cache with the default five minute TTL.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            generations: Arc::new(RwLock::new(Generations::default())),
            stats: Arc::new(RwLock::new(CacheStats::default())),
            ttl: Duration::seconds(DEFAULT_TTL_SECS),
        }
    }

    /// Create with custom TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for TtlMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryCache for TtlMemoryCache {
    async fn get(&self, key: &CacheKey) -> Option<Vec<MemoryEntry>> {
        let mut entries = self.entries.write().await;
        let mut stats = self.stats.write().await;

        let expired = match entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.hit_count += 1;
                stats.hits += 1;
                debug!(key = %key, "Memory cache hit");
                return Some(entry.payload.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.remove(key);
            stats.entry_count = entries.len() as u64;
        }
        stats.misses += 1;
        debug!(key = %key, expired, "Memory cache miss");
        None
    }

    async fn set(&self, key: CacheKey, payload: Vec<MemoryEntry>) {
        let mut entries = self.entries.write().await;
        entries.insert(key, CacheEntry::new(payload, self.ttl));

        let mut stats = self.stats.write().await;
        stats.entry_count = entries.len() as u64;
    }

    async fn generation(&self, scope: &str) -> u64 {
        let mut generations = self.generations.write().await;
        // Track the scope so later invalidations covering it are counted
        generations.scopes.entry(scope.to_string()).or_insert(0);
        generations.current(scope)
    }

    async fn set_if_current(
        &self,
        key: CacheKey,
        payload: Vec<MemoryEntry>,
        scope: &str,
        generation: u64,
    ) -> bool {
        // Entries lock first, as in `invalidate`, so the check and the
        // insert cannot interleave with an invalidation
        let mut entries = self.entries.write().await;
        if self.generations.read().await.current(scope) != generation {
            return false;
        }
        entries.insert(key, CacheEntry::new(payload, self.ttl));

        let mut stats = self.stats.write().await;
        stats.entry_count = entries.len() as u64;
        true
    }

    async fn invalidate(&self, pattern: Option<&str>) {
        let mut entries = self.entries.write().await;
        self.generations.write().await.bump(pattern);
        let before = entries.len();
        match pattern {
            Some(p) => entries.retain(|k, _| !k.as_str().contains(p)),
            None => entries.clear(),
        }

        let mut stats = self.stats.write().await;
        stats.invalidations += (before - entries.len()) as u64;
        stats.entry_count = entries.len() as u64;
        debug!(
            pattern = pattern.unwrap_or("*"),
            removed = before - entries.len(),
            "Invalidated memory cache"
        );
    }

    async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::memory::EntityType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(id: &str) -> CacheKey {
        CacheKey::new(
            &EntityKey::new(EntityType::Character, id),
            &MemoryFilter::new(),
        )
    }

    fn scope(id: &str) -> String {
        CacheKey::entity_pattern(&EntityKey::new(EntityType::Character, id))
    }

    #[test]
    fn test_cache_key_generation() {
        let entity = EntityKey::new(EntityType::Character, "c1");
        let k1 = CacheKey::new(&entity, &MemoryFilter::new().tags(["a", "b"]));
        let k2 = CacheKey::new(&entity, &MemoryFilter::new().tags(["b", "a"]));
        let k3 = CacheKey::new(&entity, &MemoryFilter::new().used_recently(true));

        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
        assert!(k1.as_str().contains(&CacheKey::entity_pattern(&entity)));
    }

    #[test]
    fn test_cache_entry_expiry() {
        let entry = CacheEntry::new(Vec::new(), Duration::minutes(5));
        assert!(!entry.is_expired());

        let entry = CacheEntry::new(Vec::new(), Duration::zero());
        assert!(entry.is_expired());
    }

    #[tokio::test]
    async fn test_get_or_load_hits_within_ttl() {
        let cache = TtlMemoryCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            get_or_load(&cache, key("c1"), &scope("c1"), || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            })
            .await
            .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats().await;
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.667).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_expired_entries_are_dropped_on_read() {
        let cache = TtlMemoryCache::new().with_ttl(Duration::zero());
        cache.set(key("c1"), Vec::new()).await;

        assert!(cache.get(&key("c1")).await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_loader_errors_are_not_cached() {
        let cache = TtlMemoryCache::new();

        let result = get_or_load(&cache, key("c1"), &scope("c1"), || {
            Err(Error::Persistence("offline".into()))
        })
        .await;

        assert!(matches!(result, Err(Error::Persistence(_))));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalidate_by_entity_pattern() {
        let cache = TtlMemoryCache::new();
        cache.set(key("c1"), Vec::new()).await;
        cache.set(key("c10"), Vec::new()).await;
        cache.set(key("c2"), Vec::new()).await;

        let pattern = CacheKey::entity_pattern(&EntityKey::new(EntityType::Character, "c1"));
        cache.invalidate(Some(&pattern)).await;

        assert!(cache.get(&key("c1")).await.is_none());
        assert!(cache.get(&key("c10")).await.is_some());
        assert!(cache.get(&key("c2")).await.is_some());

        cache.invalidate(None).await;
        assert!(cache.is_empty().await);
        assert_eq!(cache.stats().await.invalidations, 3);
    }

    #[tokio::test]
    async fn test_set_if_current_rejects_invalidated_scope() {
        let cache = TtlMemoryCache::new();

        let generation = cache.generation(&scope("c1")).await;
        cache.invalidate(Some(&scope("c1"))).await;
        assert!(
            !cache
                .set_if_current(key("c1"), Vec::new(), &scope("c1"), generation)
                .await
        );
        assert!(cache.get(&key("c1")).await.is_none());

        // Invalidating c1 leaves c10 alone
        let generation = cache.generation(&scope("c10")).await;
        cache.invalidate(Some(&scope("c1"))).await;
        assert!(
            cache
                .set_if_current(key("c10"), Vec::new(), &scope("c10"), generation)
                .await
        );

        let generation = cache.generation(&scope("c2")).await;
        cache.invalidate(None).await;
        assert!(
            !cache
                .set_if_current(key("c2"), Vec::new(), &scope("c2"), generation)
                .await
        );
    }
}

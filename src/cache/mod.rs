//! Read-through caching for memory queries.
//!
//! Query results are cached per (entity, filter) with a TTL that is checked
//! lazily on read. Writes made through [`CachedMemoryStore`] invalidate every
//! cached query of the written entity before they return.
//!
//! ## Example
//!
//! ```rust,ignore
//! use narrative_memory::cache::{CachedMemoryStore, TtlMemoryCache};
//! use narrative_memory::memory::{EntityKey, EntityType, MemoryFilter, SqliteMemoryStore};
//!
//! let memories = CachedMemoryStore::new(
//!     Arc::new(SqliteMemoryStore::in_memory()?),
//!     Arc::new(TtlMemoryCache::new()),
//! );
//! let key = EntityKey::new(EntityType::Character, "c1");
//! let entries = memories.query(&key, &MemoryFilter::new()).await?;
//! ```

mod cached_store;
mod ttl;

pub use cached_store::CachedMemoryStore;
pub use ttl::{
    get_or_load, CacheEntry, CacheKey, CacheStats, MemoryCache, TtlMemoryCache, DEFAULT_TTL_SECS,
};

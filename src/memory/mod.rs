//! Versioned memory entries attached to narrative entities.
//!
//! Each (entity_type, entity_id) pair owns a chain of versions. Creating a
//! memory supersedes the entity's current entry and becomes version n+1;
//! updates change attributes in place and never touch the version chain.
//!
//! ## Example
//!
//! ```rust,ignore
//! use narrative_memory::memory::{
//!     EntityKey, EntityType, MemoryFilter, MemoryKind, MemoryStore, NewMemory,
//!     SqliteMemoryStore,
//! };
//!
//! let store = SqliteMemoryStore::in_memory()?;
//! store.create_entry(NewMemory::new(EntityType::Character, "c1", "Loves sunsets"))?;
//! let latest = store.create_entry(
//!     NewMemory::new(EntityType::Character, "c1", "Fears the dark").with_kind(MemoryKind::Soft),
//! )?;
//! assert_eq!(latest.version, 2);
//! ```

mod schema;
mod store;
mod types;

pub use schema::{get_schema_version, initialize_schema, is_initialized, SCHEMA_VERSION};
pub use store::{default_tags, MemoryStore, SqliteMemoryStore};
pub(crate) use store::{conversion_error, parse_datetime};
pub use types::{
    normalize_tags, EntityKey, EntityType, MemoryEntry, MemoryFilter, MemoryId, MemoryKind,
    MemoryStats, MemoryTag, MemoryUpdate, NewMemory, TagCategory, DEFAULT_RELEVANCE,
};

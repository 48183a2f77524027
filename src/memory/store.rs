//! SQLite-backed memory store implementation.
//!
//! Creating a memory for an entity is the one place with a real race:
//! "deactivate the current row, then insert the next version" must happen as
//! a unit. Each create runs inside an IMMEDIATE transaction, which takes the
//! database write lock before reading the previous version, and the process
//! local connection mutex serializes callers sharing one store. The partial
//! unique index on current rows is the last line: if two writers on separate
//! connections ever slipped past each other the loser gets
//! `Error::ConcurrencyConflict` instead of a second current row.

use crate::context::TagSource;
use crate::error::{Error, Result};
use crate::memory::schema::{initialize_schema, is_initialized};
use crate::memory::types::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// How long a connection waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ENTRY_COLUMNS: &str = "id, entity_type, entity_id, text, kind, version, is_current, tags,
    last_used_scene, editable, used_recently, relevance_score, created_by, created_at, updated_at";

/// Persistence for versioned memory entries.
pub trait MemoryStore: Send + Sync {
    /// Supersede the entity's current entry (if any) with a new current version.
    fn create_entry(&self, new: NewMemory) -> Result<MemoryEntry>;

    /// Create many entries atomically. Entries for the same entity receive
    /// consecutive versions in input order; only the last one is current.
    fn batch_create_entries(&self, batch: Vec<NewMemory>) -> Result<Vec<MemoryEntry>>;

    /// Apply a partial update in place.
    fn update_entry(&self, id: &MemoryId, update: &MemoryUpdate) -> Result<MemoryEntry>;

    /// Entries for an entity sorted by relevance descending. Superseded
    /// entries are included unless the filter asks for current only.
    fn query(&self, key: &EntityKey, filter: &MemoryFilter) -> Result<Vec<MemoryEntry>>;

    fn get_entry(&self, id: &MemoryId) -> Result<Option<MemoryEntry>>;

    fn current_entry(&self, key: &EntityKey) -> Result<Option<MemoryEntry>>;

    /// All versions for an entity, oldest first.
    fn history(&self, key: &EntityKey) -> Result<Vec<MemoryEntry>>;
}

/// SQLite-backed memory store.
#[derive(Clone)]
pub struct SqliteMemoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMemoryStore {
    /// Open or create a memory store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        if !is_initialized(&conn) {
            initialize_schema(&conn)?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock connection: {}", e)))?;
        f(&conn)
    }

    // ==================== Entry Operations ====================

    fn insert_entry(conn: &Connection, entry: &MemoryEntry) -> rusqlite::Result<()> {
        let tags = serde_json::to_string(&entry.tags).unwrap_or_else(|_| "[]".to_string());
        conn.execute(
            "INSERT INTO memory_entries (
                id, entity_type, entity_id, text, kind, version, is_current, tags,
                last_used_scene, editable, used_recently, relevance_score, created_by,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                entry.id.to_string(),
                entry.entity_type.as_str(),
                entry.entity_id,
                entry.text,
                entry.kind.as_str(),
                entry.version,
                entry.is_current,
                tags,
                entry.last_used_scene,
                entry.editable,
                entry.used_recently,
                entry.relevance_score,
                entry.created_by,
                entry.created_at.to_rfc3339(),
                entry.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Highest stored version for an entity, or 0 when none exists.
    fn latest_version(conn: &Connection, key: &EntityKey) -> rusqlite::Result<u32> {
        conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM memory_entries
             WHERE entity_type = ?1 AND entity_id = ?2",
            params![key.entity_type.as_str(), key.entity_id],
            |row| row.get(0),
        )
    }

    fn deactivate_current(conn: &Connection, key: &EntityKey) -> rusqlite::Result<usize> {
        conn.execute(
            "UPDATE memory_entries SET is_current = 0
             WHERE entity_type = ?1 AND entity_id = ?2 AND is_current = 1",
            params![key.entity_type.as_str(), key.entity_id],
        )
    }

    fn build_entry(new: NewMemory, version: u32, is_current: bool) -> MemoryEntry {
        let now = Utc::now();
        MemoryEntry {
            id: MemoryId::new(),
            entity_type: new.entity_type,
            entity_id: new.entity_id,
            text: new.text,
            kind: new.kind,
            version,
            is_current,
            tags: normalize_tags(new.tags),
            last_used_scene: None,
            editable: true,
            used_recently: false,
            relevance_score: new.relevance_score,
            created_by: new.created_by,
            created_at: now,
            updated_at: now,
        }
    }

    fn get_entry_internal(
        conn: &Connection,
        id: &MemoryId,
    ) -> rusqlite::Result<Option<MemoryEntry>> {
        conn.query_row(
            &format!("SELECT {} FROM memory_entries WHERE id = ?1", ENTRY_COLUMNS),
            params![id.to_string()],
            Self::row_to_entry,
        )
        .optional()
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<MemoryEntry> {
        let id_str: String = row.get(0)?;
        let entity_type: String = row.get(1)?;
        let kind: String = row.get(4)?;
        let tags: String = row.get(7)?;

        Ok(MemoryEntry {
            id: MemoryId::parse(&id_str).map_err(|e| conversion_error(0, e))?,
            entity_type: entity_type.parse().map_err(|e| conversion_error(1, e))?,
            entity_id: row.get(2)?,
            text: row.get(3)?,
            kind: kind.parse().map_err(|e| conversion_error(4, e))?,
            version: row.get(5)?,
            is_current: row.get(6)?,
            tags: serde_json::from_str(&tags).map_err(|e| conversion_error(7, e))?,
            last_used_scene: row.get(8)?,
            editable: row.get(9)?,
            used_recently: row.get(10)?,
            relevance_score: row.get(11)?,
            created_by: row.get(12)?,
            created_at: parse_datetime(row.get::<_, String>(13)?),
            updated_at: parse_datetime(row.get::<_, String>(14)?),
        })
    }

    /// Get statistics about the memory store.
    pub fn stats(&self) -> Result<MemoryStats> {
        self.with_conn(|conn| {
            let total_entries: i64 =
                conn.query_row("SELECT COUNT(*) FROM memory_entries", [], |row| row.get(0))?;
            let current_entries: i64 = conn.query_row(
                "SELECT COUNT(*) FROM memory_entries WHERE is_current = 1",
                [],
                |row| row.get(0),
            )?;

            let mut entries_by_type = HashMap::new();
            let mut stmt =
                conn.prepare("SELECT entity_type, COUNT(*) FROM memory_entries GROUP BY entity_type")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (name, count) = row?;
                entries_by_type.insert(name.parse::<EntityType>()?, count as u64);
            }

            let mut entries_by_kind = HashMap::new();
            let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM memory_entries GROUP BY kind")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (name, count) = row?;
                entries_by_kind.insert(name.parse::<MemoryKind>()?, count as u64);
            }

            Ok(MemoryStats {
                total_entries: total_entries as u64,
                current_entries: current_entries as u64,
                entries_by_type,
                entries_by_kind,
            })
        })
    }

    // ==================== Tag Operations ====================

    /// Insert or replace a reference tag.
    pub fn upsert_tag(&self, tag: &MemoryTag) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO memory_tags (name, category, color, description)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(name) DO UPDATE SET
                    category = excluded.category,
                    color = excluded.color,
                    description = excluded.description",
                params![tag.name, tag.category.as_str(), tag.color, tag.description],
            )?;
            Ok(())
        })
    }

    /// Install the built-in tag catalog. Existing tags are left untouched.
    pub fn seed_default_tags(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let mut inserted = 0;
            for tag in default_tags() {
                inserted += conn.execute(
                    "INSERT OR IGNORE INTO memory_tags (name, category, color, description)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![tag.name, tag.category.as_str(), tag.color, tag.description],
                )?;
            }
            debug!(inserted, "Seeded default memory tags");
            Ok(inserted)
        })
    }

    fn row_to_tag(row: &rusqlite::Row) -> rusqlite::Result<MemoryTag> {
        let category: String = row.get(1)?;
        Ok(MemoryTag {
            name: row.get(0)?,
            category: category.parse().map_err(|e| conversion_error(1, e))?,
            color: row.get(2)?,
            description: row.get(3)?,
        })
    }
}

impl MemoryStore for SqliteMemoryStore {
    fn create_entry(&self, new: NewMemory) -> Result<MemoryEntry> {
        new.validate()?;
        let key = new.key();

        let entry = self.with_conn(|conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
            let version = Self::latest_version(&tx, &key)? + 1;
            Self::deactivate_current(&tx, &key)?;
            let entry = Self::build_entry(new, version, true);
            Self::insert_entry(&tx, &entry).map_err(|e| write_error(e, &key))?;
            tx.commit().map_err(|e| write_error(e, &key))?;
            Ok(entry)
        })?;

        info!(key = %key, version = entry.version, "Created memory entry");
        Ok(entry)
    }

    fn batch_create_entries(&self, batch: Vec<NewMemory>) -> Result<Vec<MemoryEntry>> {
        for new in &batch {
            new.validate()?;
        }
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        // Index of the last item per key; that one becomes current
        let mut last_for_key: HashMap<EntityKey, usize> = HashMap::new();
        for (i, new) in batch.iter().enumerate() {
            last_for_key.insert(new.key(), i);
        }

        let entries = self.with_conn(|conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

            let mut next_version: HashMap<EntityKey, u32> = HashMap::new();
            for key in last_for_key.keys() {
                next_version.insert(key.clone(), Self::latest_version(&tx, key)? + 1);
                Self::deactivate_current(&tx, key)?;
            }

            let mut entries = Vec::with_capacity(batch.len());
            for (i, new) in batch.into_iter().enumerate() {
                let key = new.key();
                let version = next_version.get(&key).copied().unwrap_or(1);
                next_version.insert(key.clone(), version + 1);

                let is_current = last_for_key.get(&key) == Some(&i);
                let entry = Self::build_entry(new, version, is_current);
                Self::insert_entry(&tx, &entry).map_err(|e| write_error(e, &key))?;
                entries.push(entry);
            }

            tx.commit()?;
            Ok(entries)
        })?;

        info!(
            entries = entries.len(),
            entities = last_for_key.len(),
            "Created memory entries in batch"
        );
        Ok(entries)
    }

    fn update_entry(&self, id: &MemoryId, update: &MemoryUpdate) -> Result<MemoryEntry> {
        update.validate()?;

        let entry = self.with_conn(|conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
            let mut entry = Self::get_entry_internal(&tx, id)?
                .ok_or_else(|| Error::not_found("memory", id.to_string()))?;
            update.apply(&mut entry);

            let tags = serde_json::to_string(&entry.tags)?;
            tx.execute(
                "UPDATE memory_entries SET
                    text = ?2, kind = ?3, tags = ?4, editable = ?5, used_recently = ?6,
                    relevance_score = ?7, last_used_scene = ?8, updated_at = ?9
                 WHERE id = ?1",
                params![
                    entry.id.to_string(),
                    entry.text,
                    entry.kind.as_str(),
                    tags,
                    entry.editable,
                    entry.used_recently,
                    entry.relevance_score,
                    entry.last_used_scene,
                    entry.updated_at.to_rfc3339(),
                ],
            )?;
            tx.commit()?;
            Ok(entry)
        })?;

        debug!(id = %entry.id, key = %entry.key(), "Updated memory entry");
        Ok(entry)
    }

    fn query(&self, key: &EntityKey, filter: &MemoryFilter) -> Result<Vec<MemoryEntry>> {
        filter.validate()?;

        self.with_conn(|conn| {
            let mut sql = format!(
                "SELECT {} FROM memory_entries WHERE entity_type = ? AND entity_id = ?",
                ENTRY_COLUMNS
            );
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![
                Box::new(key.entity_type.as_str()),
                Box::new(key.entity_id.clone()),
            ];

            if let Some(kind) = filter.kind {
                sql.push_str(" AND kind = ?");
                params_vec.push(Box::new(kind.as_str()));
            }

            if let Some(min) = filter.min_relevance {
                sql.push_str(" AND relevance_score >= ?");
                params_vec.push(Box::new(min));
            }

            if let Some(used) = filter.used_recently {
                sql.push_str(" AND used_recently = ?");
                params_vec.push(Box::new(used));
            }

            if filter.current_only {
                sql.push_str(" AND is_current = 1");
            }

            // Ties broken by newest version, then id, so repeated queries agree
            sql.push_str(" ORDER BY relevance_score DESC, version DESC, id ASC");

            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|b| b.as_ref()).collect();

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_refs.as_slice(), Self::row_to_entry)?;

            let mut entries = Vec::new();
            for row in rows {
                let entry = row?;
                // Tags live in a JSON column, so that part of the filter runs here
                if filter.matches(&entry) {
                    entries.push(entry);
                }
            }
            Ok(entries)
        })
    }

    fn get_entry(&self, id: &MemoryId) -> Result<Option<MemoryEntry>> {
        self.with_conn(|conn| Ok(Self::get_entry_internal(conn, id)?))
    }

    fn current_entry(&self, key: &EntityKey) -> Result<Option<MemoryEntry>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {} FROM memory_entries
                         WHERE entity_type = ?1 AND entity_id = ?2 AND is_current = 1",
                        ENTRY_COLUMNS
                    ),
                    params![key.entity_type.as_str(), key.entity_id],
                    Self::row_to_entry,
                )
                .optional()?)
        })
    }

    fn history(&self, key: &EntityKey) -> Result<Vec<MemoryEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM memory_entries
                 WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY version ASC",
                ENTRY_COLUMNS
            ))?;
            let entries = stmt
                .query_map(
                    params![key.entity_type.as_str(), key.entity_id],
                    Self::row_to_entry,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
    }
}

impl TagSource for SqliteMemoryStore {
    fn get_tag(&self, name: &str) -> Result<Option<MemoryTag>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT name, category, color, description FROM memory_tags WHERE name = ?1",
                    params![name],
                    Self::row_to_tag,
                )
                .optional()?)
        })
    }

    fn list_tags(&self) -> Result<Vec<MemoryTag>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, category, color, description FROM memory_tags ORDER BY name",
            )?;
            let tags = stmt
                .query_map([], Self::row_to_tag)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tags)
        })
    }
}

/// Built-in tag catalog covering every category.
pub fn default_tags() -> Vec<MemoryTag> {
    vec![
        MemoryTag::new("emotion", TagCategory::Emotion)
            .with_color("#e57373")
            .with_description("Feelings and emotional states"),
        MemoryTag::new("fear", TagCategory::Emotion).with_color("#7e57c2"),
        MemoryTag::new("joy", TagCategory::Emotion).with_color("#ffd54f"),
        MemoryTag::new("plot", TagCategory::Plot)
            .with_color("#4fc3f7")
            .with_description("Story beats and unresolved threads"),
        MemoryTag::new("battle", TagCategory::Plot).with_color("#d32f2f"),
        MemoryTag::new("lore", TagCategory::Lore)
            .with_color("#a1887f")
            .with_description("World history and established facts"),
        MemoryTag::new("relationship", TagCategory::Relationship)
            .with_color("#f06292")
            .with_description("Bonds, rivalries and promises between characters"),
        MemoryTag::new("location", TagCategory::Location).with_color("#81c784"),
        MemoryTag::new("nature", TagCategory::Location).with_color("#66bb6a"),
        MemoryTag::new("temporal", TagCategory::Temporal)
            .with_color("#90a4ae")
            .with_description("Things remembered from the past"),
    ]
}

/// Map a failed write, turning unique-index violations into conflicts.
fn write_error(e: rusqlite::Error, key: &EntityKey) -> Error {
    match e.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => {
            Error::conflict(key.entity_type.as_str(), key.entity_id.clone())
        }
        _ => Error::from(e),
    }
}

pub(crate) fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

pub(crate) fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use std::thread;

    fn character(id: &str) -> EntityKey {
        EntityKey::new(EntityType::Character, id)
    }

    #[test]
    fn test_first_create_is_version_one() {
        let store = SqliteMemoryStore::in_memory().unwrap();

        let entry = store
            .create_entry(NewMemory::new(EntityType::Character, "c1", "Loves sunsets"))
            .unwrap();

        assert_eq!(entry.version, 1);
        assert!(entry.is_current);
        assert_eq!(entry.kind, MemoryKind::Hard);
        assert_eq!(store.get_entry(&entry.id).unwrap(), Some(entry));
    }

    #[test]
    fn test_second_create_supersedes_first() {
        let store = SqliteMemoryStore::in_memory().unwrap();

        store
            .create_entry(
                NewMemory::new(EntityType::Character, "c1", "Loves sunsets").with_tags(["nature"]),
            )
            .unwrap();
        store
            .create_entry(
                NewMemory::new(EntityType::Character, "c1", "Fears the dark")
                    .with_kind(MemoryKind::Soft)
                    .with_tags(["fear"]),
            )
            .unwrap();

        let current = store
            .query(&character("c1"), &MemoryFilter::new().current_only())
            .unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].version, 2);
        assert_eq!(current[0].text, "Fears the dark");
        assert!(current[0].is_current);

        let history = store.history(&character("c1")).unwrap();
        assert_eq!(history.len(), 2);
        assert!(!history[0].is_current);
        assert_eq!(history[0].text, "Loves sunsets");
    }

    #[test]
    fn test_versions_are_per_entity() {
        let store = SqliteMemoryStore::in_memory().unwrap();

        store
            .create_entry(NewMemory::new(EntityType::Character, "c1", "a"))
            .unwrap();
        let other = store
            .create_entry(NewMemory::new(EntityType::World, "c1", "b"))
            .unwrap();

        assert_eq!(other.version, 1);
        assert!(store.current_entry(&character("c1")).unwrap().is_some());
    }

    #[test]
    fn test_versions_increase_by_one() {
        let store = SqliteMemoryStore::in_memory().unwrap();

        let versions: Vec<u32> = (0..5)
            .map(|i| {
                store
                    .create_entry(NewMemory::new(EntityType::Scene, "s1", format!("beat {}", i)))
                    .unwrap()
                    .version
            })
            .collect();

        assert_eq!(versions, vec![1, 2, 3, 4, 5]);
        assert_eq!(store.stats().unwrap().current_entries, 1);
    }

    #[test]
    fn test_batch_create_groups_by_entity() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        store
            .create_entry(NewMemory::new(EntityType::Character, "c1", "old"))
            .unwrap();

        let created = store
            .batch_create_entries(vec![
                NewMemory::new(EntityType::Character, "c1", "first"),
                NewMemory::new(EntityType::Character, "c2", "only"),
                NewMemory::new(EntityType::Character, "c1", "second"),
            ])
            .unwrap();

        assert_eq!(
            created
                .iter()
                .map(|e| (e.entity_id.as_str(), e.version, e.is_current))
                .collect::<Vec<_>>(),
            vec![("c1", 2, false), ("c2", 1, true), ("c1", 3, true)]
        );

        let c1 = store.current_entry(&character("c1")).unwrap().unwrap();
        assert_eq!(c1.text, "second");
        assert_eq!(store.stats().unwrap().current_entries, 2);
    }

    #[test]
    fn test_batch_rejects_invalid_input_without_writing() {
        let store = SqliteMemoryStore::in_memory().unwrap();

        let result = store.batch_create_entries(vec![
            NewMemory::new(EntityType::Character, "c1", "fine"),
            NewMemory::new(EntityType::Character, "c2", "bad").with_relevance(2.0),
        ]);

        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert_eq!(store.stats().unwrap().total_entries, 0);
    }

    #[test]
    fn test_update_entry_in_place() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let entry = store
            .create_entry(NewMemory::new(EntityType::Character, "c1", "Trusts Bren"))
            .unwrap();

        let updated = store
            .update_entry(
                &entry.id,
                &MemoryUpdate::new()
                    .text("Distrusts Bren")
                    .kind(MemoryKind::Soft)
                    .tags(["relationship"])
                    .used_recently(true),
            )
            .unwrap();

        assert_eq!(updated.id, entry.id);
        assert_eq!(updated.version, entry.version);
        assert!(updated.is_current);
        assert_eq!(updated.text, "Distrusts Bren");
        assert!(updated.used_recently);
        assert_eq!(store.get_entry(&entry.id).unwrap(), Some(updated));
    }

    #[test]
    fn test_update_missing_entry_is_not_found() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let err = store
            .update_entry(&MemoryId::new(), &MemoryUpdate::new().editable(false))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_query_filters_and_ordering() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        store
            .batch_create_entries(vec![
                NewMemory::new(EntityType::World, "w1", "low")
                    .with_relevance(0.2)
                    .with_tags(["lore"]),
                NewMemory::new(EntityType::World, "w1", "high")
                    .with_relevance(0.9)
                    .with_kind(MemoryKind::Soft)
                    .with_tags(["plot"]),
                NewMemory::new(EntityType::World, "w1", "mid")
                    .with_relevance(0.5)
                    .with_tags(["lore", "plot"]),
            ])
            .unwrap();
        let key = EntityKey::new(EntityType::World, "w1");

        let all = store.query(&key, &MemoryFilter::new()).unwrap();
        assert_eq!(
            all.iter().map(|e| e.text.as_str()).collect::<Vec<_>>(),
            vec!["high", "mid", "low"]
        );

        let lore = store.query(&key, &MemoryFilter::new().tags(["lore"])).unwrap();
        assert_eq!(lore.len(), 2);

        let soft = store
            .query(&key, &MemoryFilter::new().kind(MemoryKind::Soft))
            .unwrap();
        assert_eq!(soft.len(), 1);

        let relevant = store
            .query(&key, &MemoryFilter::new().min_relevance(0.5))
            .unwrap();
        assert_eq!(relevant.len(), 2);

        assert_eq!(store.query(&key, &MemoryFilter::new()).unwrap(), all);
    }

    #[test]
    fn test_concurrent_creates_on_shared_store() {
        let store = SqliteMemoryStore::in_memory().unwrap();

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    store
                        .create_entry(NewMemory::new(
                            EntityType::Character,
                            "c1",
                            format!("t{}", i),
                        ))
                        .unwrap()
                        .version
                })
            })
            .collect();
        let versions: BTreeSet<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(versions, BTreeSet::from([1, 2]));
        assert_eq!(store.stats().unwrap().current_entries, 1);
    }

    #[test]
    fn test_concurrent_creates_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");
        // Create the schema once before racing
        SqliteMemoryStore::open(&path).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let path = path.clone();
                thread::spawn(move || {
                    let store = SqliteMemoryStore::open(&path).unwrap();
                    store
                        .create_entry(NewMemory::new(
                            EntityType::Character,
                            "c1",
                            format!("t{}", i),
                        ))
                        .unwrap()
                        .version
                })
            })
            .collect();
        let versions: BTreeSet<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(versions, BTreeSet::from([1, 2, 3, 4]));
        let store = SqliteMemoryStore::open(&path).unwrap();
        let current = store
            .query(&character("c1"), &MemoryFilter::new().current_only())
            .unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].version, 4);
    }

    #[test]
    fn test_tags_roundtrip_and_seed() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        assert_eq!(store.seed_default_tags().unwrap(), default_tags().len());
        assert_eq!(store.seed_default_tags().unwrap(), 0);

        let fear = store.get_tag("fear").unwrap().unwrap();
        assert_eq!(fear.category, TagCategory::Emotion);
        assert!(store.get_tag("unknown").unwrap().is_none());

        store
            .upsert_tag(&MemoryTag::new("fear", TagCategory::Plot).with_color("#000000"))
            .unwrap();
        assert_eq!(
            store.get_tag("fear").unwrap().unwrap().category,
            TagCategory::Plot
        );
    }
}

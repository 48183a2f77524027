//! Assembles narrative text and active memories into a context bundle.

use std::sync::Arc;
use tracing::{debug, instrument};

use super::sources::{NarrativeSource, TagSource};
use super::types::{
    CharacterRecord, ContextBundle, RegionRecord, SceneRecord, TimelineEventRecord, WorldRecord,
};
use crate::cache::CachedMemoryStore;
use crate::error::Result;
use crate::memory::{EntityKey, EntityType, MemoryEntry, MemoryFilter, MemoryTag};

/// Builds [`ContextBundle`]s. Read-only: never mutates a memory entry.
#[derive(Clone)]
pub struct ContextBuilder {
    memories: CachedMemoryStore,
    narrative: Arc<dyn NarrativeSource>,
    tags: Arc<dyn TagSource>,
}

impl ContextBuilder {
    pub fn new(
        memories: CachedMemoryStore,
        narrative: Arc<dyn NarrativeSource>,
        tags: Arc<dyn TagSource>,
    ) -> Self {
        Self {
            memories,
            narrative,
            tags,
        }
    }

    #[instrument(skip(self))]
    pub async fn build(
        &self,
        world_id: &str,
        character_id: Option<&str>,
        scene_id: Option<&str>,
    ) -> Result<ContextBundle> {
        let world_context = match self.narrative.world(world_id).await? {
            Some(world) => {
                let events = self.narrative.timeline_events(world_id).await?;
                format_world(&world, &events)
            }
            None => String::new(),
        };

        let character_context = match character_id {
            Some(id) => self
                .narrative
                .character(id)
                .await?
                .map(|c| format_character(&c))
                .unwrap_or_default(),
            None => String::new(),
        };

        let scene_context = match scene_id {
            Some(id) => match self.narrative.scene(id).await? {
                Some(scene) => {
                    let region = match scene.region_id.as_deref() {
                        Some(region_id) => self.narrative.region(region_id).await?,
                        None => None,
                    };
                    format_scene(&scene, region.as_ref())
                }
                None => String::new(),
            },
            None => String::new(),
        };

        let active_memories = self.active_memories(world_id, character_id).await?;
        let memory_context = format_memories(&active_memories);
        let relevant_tags = self.resolve_tags(&active_memories)?;

        debug!(
            memories = active_memories.len(),
            tags = relevant_tags.len(),
            "Built context bundle"
        );

        Ok(ContextBundle {
            world_id: world_id.to_string(),
            character_id: character_id.map(str::to_string),
            scene_id: scene_id.map(str::to_string),
            world_context,
            character_context,
            scene_context,
            memory_context,
            active_memories,
            relevant_tags,
        })
    }

    /// Recently used world memories plus (optionally) the character's,
    /// sorted by stored relevance.
    async fn active_memories(
        &self,
        world_id: &str,
        character_id: Option<&str>,
    ) -> Result<Vec<MemoryEntry>> {
        let recent = MemoryFilter::new().used_recently(true);

        let mut memories = self
            .memories
            .query(&EntityKey::new(EntityType::World, world_id), &recent)
            .await?;

        if let Some(id) = character_id {
            memories.extend(
                self.memories
                    .query(&EntityKey::new(EntityType::Character, id), &recent)
                    .await?,
            );
        }

        memories.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(memories)
    }

    /// Union of tag names in first-seen order; unknown names are skipped.
    fn resolve_tags(&self, memories: &[MemoryEntry]) -> Result<Vec<MemoryTag>> {
        let mut seen: Vec<&str> = Vec::new();
        for tag in memories.iter().flat_map(|m| m.tags.iter()) {
            if !seen.contains(&tag.as_str()) {
                seen.push(tag.as_str());
            }
        }

        let mut resolved = Vec::new();
        for name in seen {
            match self.tags.get_tag(name)? {
                Some(tag) => resolved.push(tag),
                None => debug!(tag = name, "Dropping unresolved tag"),
            }
        }
        Ok(resolved)
    }
}

/// One `[KIND] text` line per memory.
pub fn format_memories(memories: &[MemoryEntry]) -> String {
    memories
        .iter()
        .map(|m| format!("[{}] {}", m.kind.label(), m.text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_world(world: &WorldRecord, events: &[TimelineEventRecord]) -> String {
    let mut out = format!("World: {}", world.name);
    if let Some(ref genre) = world.genre {
        out.push_str(&format!(" ({})", genre));
    }
    if !world.description.is_empty() {
        out.push('\n');
        out.push_str(&world.description);
    }
    if !events.is_empty() {
        out.push_str("\nTimeline:");
        for event in events {
            let line = match event.era {
                Some(ref era) => format!("\n- [{}] {}: {}", era, event.name, event.description),
                None => format!("\n- {}: {}", event.name, event.description),
            };
            out.push_str(&line);
        }
    }
    out
}

fn format_character(character: &CharacterRecord) -> String {
    let mut out = format!("Character: {}", character.name);
    if let Some(ref species) = character.species {
        out.push_str(&format!(" ({})", species));
    }
    if !character.description.is_empty() {
        out.push('\n');
        out.push_str(&character.description);
    }
    if let Some(ref personality) = character.personality {
        out.push_str(&format!("\nPersonality: {}", personality));
    }
    out
}

fn format_scene(scene: &SceneRecord, region: Option<&RegionRecord>) -> String {
    let mut out = format!("Scene: {}", scene.title);
    if !scene.description.is_empty() {
        out.push('\n');
        out.push_str(&scene.description);
    }
    if let Some(region) = region {
        out.push_str(&format!("\nLocation: {} - {}", region.name, region.description));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlMemoryCache;
    use crate::context::StaticNarrativeSource;
    use crate::memory::{MemoryKind, MemoryStore, MemoryUpdate, NewMemory, SqliteMemoryStore};
    use pretty_assertions::assert_eq;

    fn narrative() -> StaticNarrativeSource {
        StaticNarrativeSource::new()
            .with_world(
                WorldRecord::new("w1", "Eldoria")
                    .with_genre("high fantasy")
                    .with_description("A realm of floating isles."),
            )
            .with_character(
                CharacterRecord::new("c1", "Aria")
                    .with_species("elf")
                    .with_description("A wandering cartographer."),
            )
            .with_scene(
                SceneRecord::new("s1", "The Harbor")
                    .with_description("Fog over the docks.")
                    .in_region("r1"),
            )
            .with_region(RegionRecord {
                id: "r1".into(),
                name: "Saltmarsh".into(),
                description: "Tidal flats".into(),
            })
    }

    fn setup() -> (SqliteMemoryStore, ContextBuilder) {
        let store = SqliteMemoryStore::in_memory().unwrap();
        store.seed_default_tags().unwrap();
        let memories = CachedMemoryStore::new(Arc::new(store.clone()), Arc::new(TtlMemoryCache::new()));
        let builder = ContextBuilder::new(memories, Arc::new(narrative()), Arc::new(store.clone()));
        (store, builder)
    }

    fn remember(store: &SqliteMemoryStore, new: NewMemory) -> MemoryEntry {
        let entry = store.create_entry(new).unwrap();
        store
            .update_entry(&entry.id, &MemoryUpdate::new().used_recently(true))
            .unwrap()
    }

    #[tokio::test]
    async fn test_world_only_bundle_has_empty_character_and_scene() {
        let (_, builder) = setup();

        let bundle = builder.build("w1", None, None).await.unwrap();

        assert_eq!(bundle.character_context, "");
        assert_eq!(bundle.scene_context, "");
        assert_eq!(
            bundle.world_context,
            "World: Eldoria (high fantasy)\nA realm of floating isles."
        );
    }

    #[tokio::test]
    async fn test_unknown_ids_yield_empty_strings() {
        let (_, builder) = setup();

        let bundle = builder
            .build("missing", Some("nobody"), Some("nowhere"))
            .await
            .unwrap();

        assert_eq!(bundle.world_context, "");
        assert_eq!(bundle.character_context, "");
        assert_eq!(bundle.scene_context, "");
    }

    #[tokio::test]
    async fn test_full_bundle() {
        let (store, builder) = setup();
        remember(
            &store,
            NewMemory::new(EntityType::World, "w1", "The isles drift north each winter")
                .with_relevance(0.4)
                .with_tags(["lore"]),
        );
        remember(
            &store,
            NewMemory::new(EntityType::Character, "c1", "Aria fears deep water")
                .with_kind(MemoryKind::Soft)
                .with_relevance(0.9)
                .with_tags(["fear", "custom-tag"]),
        );
        // Not recently used, so not active
        store
            .create_entry(NewMemory::new(EntityType::Region, "r1", "ignored"))
            .unwrap();

        let bundle = builder.build("w1", Some("c1"), Some("s1")).await.unwrap();

        assert_eq!(
            bundle.character_context,
            "Character: Aria (elf)\nA wandering cartographer."
        );
        assert_eq!(
            bundle.scene_context,
            "Scene: The Harbor\nFog over the docks.\nLocation: Saltmarsh - Tidal flats"
        );
        assert_eq!(
            bundle.memory_context,
            "[SOFT] Aria fears deep water\n[HARD] The isles drift north each winter"
        );
        assert_eq!(
            bundle
                .relevant_tags
                .iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>(),
            vec!["fear", "lore"]
        );
    }

    #[tokio::test]
    async fn test_build_does_not_mutate_memories() {
        let (store, builder) = setup();
        let entry = remember(
            &store,
            NewMemory::new(EntityType::Character, "c1", "Hums when nervous"),
        );

        builder.build("w1", Some("c1"), None).await.unwrap();

        assert_eq!(store.get_entry(&entry.id).unwrap(), Some(entry));
    }

    #[test]
    fn test_format_world_with_timeline() {
        let world = WorldRecord::new("w1", "Eldoria");
        let events = vec![TimelineEventRecord {
            id: "e1".into(),
            name: "The Sundering".into(),
            description: "The isles broke apart".into(),
            era: Some("Age of Ash".into()),
        }];

        assert_eq!(
            format_world(&world, &events),
            "World: Eldoria\nTimeline:\n- [Age of Ash] The Sundering: The isles broke apart"
        );
    }
}

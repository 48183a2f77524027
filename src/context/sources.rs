//! Collaborators the context builder reads from.

use async_trait::async_trait;
use std::collections::HashMap;

use super::types::{
    CharacterRecord, RegionRecord, SceneRecord, TimelineEventRecord, WorldRecord,
};
use crate::error::Result;
use crate::memory::MemoryTag;

/// Id-keyed lookup of narrative records owned by the application's data layer.
#[async_trait]
pub trait NarrativeSource: Send + Sync {
    async fn world(&self, id: &str) -> Result<Option<WorldRecord>>;

    async fn character(&self, id: &str) -> Result<Option<CharacterRecord>>;

    async fn scene(&self, id: &str) -> Result<Option<SceneRecord>>;

    async fn region(&self, _id: &str) -> Result<Option<RegionRecord>> {
        Ok(None)
    }

    /// Timeline events of a world, oldest first.
    async fn timeline_events(&self, _world_id: &str) -> Result<Vec<TimelineEventRecord>> {
        Ok(Vec::new())
    }
}

/// Name-keyed lookup of reference tags.
pub trait TagSource: Send + Sync {
    fn get_tag(&self, name: &str) -> Result<Option<MemoryTag>>;

    fn list_tags(&self) -> Result<Vec<MemoryTag>>;
}

/// Narrative source backed by fixed maps. Useful for tools, demos and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticNarrativeSource {
    worlds: HashMap<String, WorldRecord>,
    characters: HashMap<String, CharacterRecord>,
    scenes: HashMap<String, SceneRecord>,
    regions: HashMap<String, RegionRecord>,
    events: HashMap<String, Vec<TimelineEventRecord>>,
}

impl StaticNarrativeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_world(mut self, world: WorldRecord) -> Self {
        self.worlds.insert(world.id.clone(), world);
        self
    }

    pub fn with_character(mut self, character: CharacterRecord) -> Self {
        self.characters.insert(character.id.clone(), character);
        self
    }

    pub fn with_scene(mut self, scene: SceneRecord) -> Self {
        self.scenes.insert(scene.id.clone(), scene);
        self
    }

    pub fn with_region(mut self, region: RegionRecord) -> Self {
        self.regions.insert(region.id.clone(), region);
        self
    }

    pub fn with_event(mut self, world_id: impl Into<String>, event: TimelineEventRecord) -> Self {
        self.events.entry(world_id.into()).or_default().push(event);
        self
    }
}

#[async_trait]
impl NarrativeSource for StaticNarrativeSource {
    async fn world(&self, id: &str) -> Result<Option<WorldRecord>> {
        Ok(self.worlds.get(id).cloned())
    }

    async fn character(&self, id: &str) -> Result<Option<CharacterRecord>> {
        Ok(self.characters.get(id).cloned())
    }

    async fn scene(&self, id: &str) -> Result<Option<SceneRecord>> {
        Ok(self.scenes.get(id).cloned())
    }

    async fn region(&self, id: &str) -> Result<Option<RegionRecord>> {
        Ok(self.regions.get(id).cloned())
    }

    async fn timeline_events(&self, world_id: &str) -> Result<Vec<TimelineEventRecord>> {
        Ok(self.events.get(world_id).cloned().unwrap_or_default())
    }
}

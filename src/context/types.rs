//! Narrative records and the assembled context bundle.

use serde::{Deserialize, Serialize};

use crate::memory::{MemoryEntry, MemoryId, MemoryTag};

/// A story world.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub genre: Option<String>,
}

impl WorldRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }
}

/// A character living in a world.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub species: Option<String>,
    pub description: String,
    #[serde(default)]
    pub personality: Option<String>,
}

impl CharacterRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_species(mut self, species: impl Into<String>) -> Self {
        self.species = Some(species.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_personality(mut self, personality: impl Into<String>) -> Self {
        self.personality = Some(personality.into());
        self
    }
}

/// A scene within a chapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub region_id: Option<String>,
}

impl SceneRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn in_region(mut self, region_id: impl Into<String>) -> Self {
        self.region_id = Some(region_id.into());
        self
    }
}

/// A named place in a world.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionRecord {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Something that happened in a world's history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineEventRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub era: Option<String>,
}

/// Context assembled for one generation request. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub world_id: String,
    pub character_id: Option<String>,
    pub scene_id: Option<String>,
    pub world_context: String,
    pub character_context: String,
    pub scene_context: String,
    /// One `[KIND] text` line per active memory
    pub memory_context: String,
    /// Sorted by relevance descending
    pub active_memories: Vec<MemoryEntry>,
    pub relevant_tags: Vec<MemoryTag>,
}

impl ContextBundle {
    pub fn memory_ids(&self) -> Vec<MemoryId> {
        self.active_memories.iter().map(|m| m.id.clone()).collect()
    }

    pub fn has_memories(&self) -> bool {
        !self.active_memories.is_empty()
    }
}

//! Memory entry, tag and filter types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Unique identifier for a memory entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::invalid(format!("malformed memory id '{}': {}", s, e)))
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of narrative entity a memory is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Character,
    Region,
    World,
    TimelineEvent,
    Scene,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        Self::Character,
        Self::Region,
        Self::World,
        Self::TimelineEvent,
        Self::Scene,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Region => "region",
            Self::World => "world",
            Self::TimelineEvent => "timeline_event",
            Self::Scene => "scene",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "character" => Ok(Self::Character),
            "region" => Ok(Self::Region),
            "world" => Ok(Self::World),
            "timeline_event" => Ok(Self::TimelineEvent),
            "scene" => Ok(Self::Scene),
            _ => Err(Error::invalid(format!("unknown entity type: {}", s))),
        }
    }
}

/// How durable a memory is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Canonical fact that should not drift
    #[default]
    Hard,
    /// Impression or belief that can be reinforced or revised
    Soft,
    /// Short-lived detail
    Ephemeral,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hard => "hard",
            Self::Soft => "soft",
            Self::Ephemeral => "ephemeral",
        }
    }

    /// Uppercase label used when formatting memory context.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Hard => "HARD",
            Self::Soft => "SOFT",
            Self::Ephemeral => "EPHEMERAL",
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hard" => Ok(Self::Hard),
            "soft" => Ok(Self::Soft),
            "ephemeral" => Ok(Self::Ephemeral),
            _ => Err(Error::invalid(format!("unknown memory kind: {}", s))),
        }
    }
}

/// Category of a reference tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagCategory {
    Emotion,
    Plot,
    Lore,
    Relationship,
    Location,
    Temporal,
}

impl TagCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emotion => "emotion",
            Self::Plot => "plot",
            Self::Lore => "lore",
            Self::Relationship => "relationship",
            Self::Location => "location",
            Self::Temporal => "temporal",
        }
    }
}

impl std::fmt::Display for TagCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "emotion" => Ok(Self::Emotion),
            "plot" => Ok(Self::Plot),
            "lore" => Ok(Self::Lore),
            "relationship" => Ok(Self::Relationship),
            "location" => Ok(Self::Location),
            "temporal" => Ok(Self::Temporal),
            _ => Err(Error::invalid(format!("unknown tag category: {}", s))),
        }
    }
}

/// Reference data describing a tag. Entries only hold tag names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryTag {
    pub name: String,
    pub category: TagCategory,
    pub color: String,
    pub description: String,
}

impl MemoryTag {
    pub fn new(name: impl Into<String>, category: TagCategory) -> Self {
        Self {
            name: name.into(),
            category,
            color: "#888888".to_string(),
            description: String::new(),
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A versioned memory snippet attached to a narrative entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: MemoryId,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub text: String,
    pub kind: MemoryKind,
    /// Starts at 1 and increases by one per create for the same entity
    pub version: u32,
    pub is_current: bool,
    pub tags: Vec<String>,
    pub last_used_scene: Option<String>,
    pub editable: bool,
    pub used_recently: bool,
    /// Heuristic usefulness in [0, 1]
    pub relevance_score: f64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity_type, self.entity_id.clone())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// The (entity_type, entity_id) pair that owns a version chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity_type: EntityType,
    pub entity_id: String,
}

impl EntityKey {
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
        }
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

/// Default relevance for freshly created memories.
pub const DEFAULT_RELEVANCE: f64 = 0.5;

/// Input for creating a memory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMemory {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub text: String,
    #[serde(default)]
    pub kind: MemoryKind,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_relevance")]
    pub relevance_score: f64,
    #[serde(default = "default_creator")]
    pub created_by: String,
}

fn default_relevance() -> f64 {
    DEFAULT_RELEVANCE
}

fn default_creator() -> String {
    "system".to_string()
}

impl NewMemory {
    pub fn new(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            text: text.into(),
            kind: MemoryKind::Hard,
            tags: Vec::new(),
            relevance_score: DEFAULT_RELEVANCE,
            created_by: default_creator(),
        }
    }

    /// Build from string-typed input, rejecting unknown entity types.
    pub fn parse(entity_type: &str, entity_id: &str, text: &str) -> Result<Self> {
        Ok(Self::new(entity_type.parse()?, entity_id, text))
    }

    pub fn with_kind(mut self, kind: MemoryKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_relevance(mut self, score: f64) -> Self {
        self.relevance_score = score;
        self
    }

    pub fn with_creator(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = created_by.into();
        self
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity_type, self.entity_id.clone())
    }

    pub fn validate(&self) -> Result<()> {
        if self.entity_id.trim().is_empty() {
            return Err(Error::invalid("entity_id must not be empty"));
        }
        validate_score("relevance_score", self.relevance_score)
    }
}

/// Partial update applied in place; never touches id, version or entity linkage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryUpdate {
    pub text: Option<String>,
    pub kind: Option<MemoryKind>,
    pub tags: Option<Vec<String>>,
    pub editable: Option<bool>,
    pub used_recently: Option<bool>,
    pub relevance_score: Option<f64>,
    pub last_used_scene: Option<String>,
}

impl MemoryUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn kind(mut self, kind: MemoryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn editable(mut self, editable: bool) -> Self {
        self.editable = Some(editable);
        self
    }

    pub fn used_recently(mut self, used: bool) -> Self {
        self.used_recently = Some(used);
        self
    }

    pub fn relevance_score(mut self, score: f64) -> Self {
        self.relevance_score = Some(score);
        self
    }

    pub fn last_used_scene(mut self, scene_id: impl Into<String>) -> Self {
        self.last_used_scene = Some(scene_id.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        match self.relevance_score {
            Some(score) => validate_score("relevance_score", score),
            None => Ok(()),
        }
    }

    /// Apply the update to an entry, refreshing `updated_at`.
    pub fn apply(&self, entry: &mut MemoryEntry) {
        if let Some(ref text) = self.text {
            entry.text = text.clone();
        }
        if let Some(kind) = self.kind {
            entry.kind = kind;
        }
        if let Some(ref tags) = self.tags {
            entry.tags = normalize_tags(tags.iter().cloned());
        }
        if let Some(editable) = self.editable {
            entry.editable = editable;
        }
        if let Some(used) = self.used_recently {
            entry.used_recently = used;
        }
        if let Some(score) = self.relevance_score {
            entry.relevance_score = score;
        }
        if let Some(ref scene) = self.last_used_scene {
            entry.last_used_scene = Some(scene.clone());
        }
        entry.updated_at = Utc::now();
    }
}

/// Query filter for memory entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryFilter {
    pub kind: Option<MemoryKind>,
    /// Matches entries carrying any of these tags; empty matches everything
    #[serde(default)]
    pub tags: Vec<String>,
    pub min_relevance: Option<f64>,
    pub used_recently: Option<bool>,
    #[serde(default)]
    pub current_only: bool,
}

impl MemoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: MemoryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn min_relevance(mut self, min: f64) -> Self {
        self.min_relevance = Some(min);
        self
    }

    pub fn used_recently(mut self, used: bool) -> Self {
        self.used_recently = Some(used);
        self
    }

    pub fn current_only(mut self) -> Self {
        self.current_only = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        match self.min_relevance {
            Some(min) => validate_score("min_relevance", min),
            None => Ok(()),
        }
    }

    pub fn matches(&self, entry: &MemoryEntry) -> bool {
        if let Some(kind) = self.kind {
            if entry.kind != kind {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| entry.has_tag(t)) {
            return false;
        }
        if let Some(min) = self.min_relevance {
            if entry.relevance_score < min {
                return false;
            }
        }
        if let Some(used) = self.used_recently {
            if entry.used_recently != used {
                return false;
            }
        }
        !self.current_only || entry.is_current
    }

    /// Stable textual form used for cache keys. Tag order does not matter.
    pub fn fingerprint(&self) -> String {
        let mut tags = self.tags.clone();
        tags.sort();
        tags.dedup();
        format!(
            "kind={};tags={};min={};used={};current={}",
            self.kind.map(|k| k.as_str()).unwrap_or("*"),
            tags.join(","),
            self.min_relevance
                .map(|m| m.to_string())
                .unwrap_or_else(|| "*".to_string()),
            self.used_recently
                .map(|u| u.to_string())
                .unwrap_or_else(|| "*".to_string()),
            self.current_only,
        )
    }
}

/// Statistics about the memory store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_entries: u64,
    pub current_entries: u64,
    pub entries_by_type: HashMap<EntityType, u64>,
    pub entries_by_kind: HashMap<MemoryKind, u64>,
}

/// Trim, drop empties and de-duplicate tags, keeping first-seen order.
pub fn normalize_tags<I>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

fn validate_score(field: &str, score: f64) -> Result<()> {
    if score.is_finite() && (0.0..=1.0).contains(&score) {
        Ok(())
    } else {
        Err(Error::invalid(format!(
            "{} must be within [0, 1], got {}",
            field, score
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_entity_type_parsing() {
        for et in EntityType::ALL {
            assert_eq!(et.as_str().parse::<EntityType>().unwrap(), et);
        }
        let err = "spaceship".parse::<EntityType>().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_memory_kind_parsing() {
        assert_eq!("soft".parse::<MemoryKind>().unwrap(), MemoryKind::Soft);
        assert_eq!(MemoryKind::Ephemeral.label(), "EPHEMERAL");
        assert!("permanent".parse::<MemoryKind>().is_err());
    }

    #[test]
    fn test_new_memory_parse_rejects_bad_type() {
        assert!(NewMemory::parse("character", "c1", "Loves sunsets").is_ok());
        assert!(matches!(
            NewMemory::parse("planet", "p1", "Hot"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(
            vec![" fear ", "fear", "", "night"]
                .into_iter()
                .map(String::from),
        );
        assert_eq!(tags, vec!["fear".to_string(), "night".to_string()]);
    }

    #[test]
    fn test_filter_fingerprint_ignores_tag_order() {
        let a = MemoryFilter::new().tags(["b", "a"]);
        let b = MemoryFilter::new().tags(["a", "b"]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), MemoryFilter::new().fingerprint());
    }

    #[test]
    fn test_filter_validation() {
        assert!(MemoryFilter::new().min_relevance(0.4).validate().is_ok());
        assert!(MemoryFilter::new().min_relevance(1.5).validate().is_err());
        assert!(MemoryUpdate::new().relevance_score(-0.1).validate().is_err());
    }
}

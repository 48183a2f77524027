//! Learner output types.

use serde::{Deserialize, Serialize};

use crate::memory::{MemoryEntry, MemoryId};

/// How two memories are related.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    /// Shared tag vocabulary
    Semantic,
}

/// A weighted link between a newly learned memory and an existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConnection {
    pub source_id: MemoryId,
    pub target_id: MemoryId,
    pub strength: f64,
    pub connection_type: ConnectionType,
}

impl MemoryConnection {
    pub fn semantic(source_id: MemoryId, target_id: MemoryId, strength: f64) -> Self {
        Self {
            source_id,
            target_id,
            strength,
            connection_type: ConnectionType::Semantic,
        }
    }
}

/// Everything one `learn` call wrote or derived.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningOutcome {
    pub new_entries: Vec<MemoryEntry>,
    pub updated_entries: Vec<MemoryEntry>,
    pub connections: Vec<MemoryConnection>,
}

impl LearningOutcome {
    pub fn is_empty(&self) -> bool {
        self.new_entries.is_empty() && self.updated_entries.is_empty()
    }
}

/// Shared tags over the larger tag count; 0 when either side has no tags.
pub fn connection_strength(a: &MemoryEntry, b: &MemoryEntry) -> f64 {
    let larger = a.tags.len().max(b.tags.len());
    if a.tags.is_empty() || b.tags.is_empty() {
        return 0.0;
    }
    let shared = a
        .tags
        .iter()
        .filter(|t| b.tags.iter().any(|o| o.eq_ignore_ascii_case(t)))
        .count();
    shared as f64 / larger as f64
}

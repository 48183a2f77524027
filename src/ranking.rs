//! Relevance scoring of memories against request text.
//!
//! A memory's score starts at its stored relevance and gains a fixed bonus
//! for every tag that appears inside a word of the context. Ranking is a
//! stable sort on that score, so equal scores keep their input order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::memory::MemoryEntry;

/// Bonus added per matching tag.
pub const TAG_BONUS: f64 = 0.2;

/// A memory paired with its score for one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub entry: MemoryEntry,
    pub score: f64,
}

/// Scores and orders memories. Holds no state beyond its weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelevanceRanker {
    pub tag_bonus: f64,
}

impl Default for RelevanceRanker {
    fn default() -> Self {
        Self {
            tag_bonus: TAG_BONUS,
        }
    }
}

impl RelevanceRanker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag_bonus(mut self, bonus: f64) -> Self {
        self.tag_bonus = bonus.max(0.0);
        self
    }

    /// Score in [0, 1]; never below the entry's own relevance.
    pub fn score(&self, entry: &MemoryEntry, context: &str) -> f64 {
        let context = context.to_lowercase();
        let tokens: Vec<&str> = context.split_whitespace().collect();

        let matches = entry
            .tags
            .iter()
            .map(|t| t.to_lowercase())
            .filter(|t| !t.is_empty())
            .filter(|t| tokens.iter().any(|token| token.contains(t.as_str())))
            .count();

        let base = entry.relevance_score;
        (base + matches as f64 * self.tag_bonus).min(1.0).max(base.max(0.0))
    }

    /// Top `limit` entries by score, stable on ties.
    pub fn rank(&self, entries: &[MemoryEntry], context: &str, limit: usize) -> Vec<ScoredMemory> {
        let mut scored: Vec<ScoredMemory> = entries
            .iter()
            .map(|entry| ScoredMemory {
                score: self.score(entry, context),
                entry: entry.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(limit);
        scored
    }
}

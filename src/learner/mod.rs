//! Learning from generated interactions.
//!
//! After every generation the learner asks its [`Analyzer`] for memories
//! worth keeping and writes them as soft memories of the interacting entity
//! (the character, for chat). Active soft memories the exchange touched are
//! marked as recently used, and each new memory is linked to the active ones
//! that share its tags.

mod analyzer;
mod types;

pub use analyzer::{Analyzer, KeywordAnalyzer, MemoryCandidate, Suggestions, MAX_CANDIDATE_CHARS};
pub use types::{connection_strength, ConnectionType, LearningOutcome, MemoryConnection};

use std::sync::Arc;
use tracing::{debug, instrument};

use crate::cache::CachedMemoryStore;
use crate::context::ContextBundle;
use crate::error::Result;
use crate::memory::{EntityKey, EntityType, MemoryEntry, MemoryKind, MemoryUpdate, NewMemory};
use analyzer::{split_sentences, truncate_chars};

/// Default minimum strength for a connection to be reported.
pub const DEFAULT_CONNECTION_THRESHOLD: f64 = 0.3;

/// Longest "enhanced" annotation appended to a triggered memory.
const MAX_ANNOTATION_CHARS: usize = 120;

const LEARNER: &str = "learner";

/// Turns interactions into memory writes.
#[derive(Clone)]
pub struct InteractionLearner {
    memories: CachedMemoryStore,
    analyzer: Arc<dyn Analyzer>,
    connection_threshold: f64,
}

impl InteractionLearner {
    pub fn new(memories: CachedMemoryStore, analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            memories,
            analyzer,
            connection_threshold: DEFAULT_CONNECTION_THRESHOLD,
        }
    }

    pub fn with_connection_threshold(mut self, threshold: f64) -> Self {
        self.connection_threshold = threshold;
        self
    }

    pub fn analyzer(&self) -> &Arc<dyn Analyzer> {
        &self.analyzer
    }

    /// Learn from a character interaction; new memories attach to the character.
    pub async fn learn(
        &self,
        entity_id: &str,
        prompt: &str,
        response: &str,
        bundle: &ContextBundle,
    ) -> Result<LearningOutcome> {
        let key = EntityKey::new(EntityType::Character, entity_id);
        self.learn_for(&key, prompt, response, bundle).await
    }

    /// Learn from an interaction, attaching new memories to `key`.
    #[instrument(skip(self, prompt, response, bundle), fields(key = %key))]
    pub async fn learn_for(
        &self,
        key: &EntityKey,
        prompt: &str,
        response: &str,
        bundle: &ContextBundle,
    ) -> Result<LearningOutcome> {
        let mut outcome = LearningOutcome::default();

        for candidate in self.analyzer.extract_candidates(prompt, response) {
            let entry = self
                .memories
                .create_entry(
                    NewMemory::new(key.entity_type, key.entity_id.clone(), candidate.text)
                        .with_kind(MemoryKind::Soft)
                        .with_tags(candidate.tags)
                        .with_creator(LEARNER),
                )
                .await?;
            outcome.new_entries.push(entry);
        }

        let interaction = format!("{}\n{}", prompt, response);
        let annotation = split_sentences(response)
            .first()
            .map(|s| truncate_chars(s, MAX_ANNOTATION_CHARS));

        for memory in &bundle.active_memories {
            if memory.kind != MemoryKind::Soft || !self.analyzer.triggers(memory, &interaction) {
                continue;
            }
            let update = enhancement(memory, annotation.as_deref());
            outcome
                .updated_entries
                .push(self.memories.update_entry(&memory.id, &update).await?);
        }

        outcome.connections = self.connect(&outcome.new_entries, &bundle.active_memories);

        debug!(
            created = outcome.new_entries.len(),
            updated = outcome.updated_entries.len(),
            connections = outcome.connections.len(),
            "Learned from interaction"
        );
        Ok(outcome)
    }

    fn connect(&self, new: &[MemoryEntry], active: &[MemoryEntry]) -> Vec<MemoryConnection> {
        let mut connections = Vec::new();
        for source in new {
            for target in active {
                let strength = connection_strength(source, target);
                if strength > self.connection_threshold {
                    connections.push(MemoryConnection::semantic(
                        source.id.clone(),
                        target.id.clone(),
                        strength,
                    ));
                }
            }
        }
        connections
    }
}

/// Mark as recently used and append the annotation when the response has one.
fn enhancement(memory: &MemoryEntry, annotation: Option<&str>) -> MemoryUpdate {
    let update = MemoryUpdate::new().used_recently(true);
    match annotation {
        Some(note) => update.text(format!("{} [enhanced: {}]", memory.text, note)),
        None => update,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlMemoryCache;
    use crate::memory::{MemoryFilter, MemoryStore, SqliteMemoryStore};
    use pretty_assertions::assert_eq;

    fn setup() -> (SqliteMemoryStore, CachedMemoryStore, InteractionLearner) {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let memories =
            CachedMemoryStore::new(Arc::new(store.clone()), Arc::new(TtlMemoryCache::new()));
        let learner = InteractionLearner::new(memories.clone(), Arc::new(KeywordAnalyzer::new()));
        (store, memories, learner)
    }

    fn active(store: &SqliteMemoryStore, new: NewMemory) -> MemoryEntry {
        let entry = store.create_entry(new).unwrap();
        store
            .update_entry(&entry.id, &MemoryUpdate::new().used_recently(true))
            .unwrap()
    }

    fn bundle(active_memories: Vec<MemoryEntry>) -> ContextBundle {
        ContextBundle {
            world_id: "w1".to_string(),
            character_id: Some("c1".to_string()),
            active_memories,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_candidates_become_soft_character_memories() {
        let (_, memories, learner) = setup();

        let outcome = learner
            .learn("c1", "Tell me about home", "I remember the lighthouse.", &bundle(vec![]))
            .await
            .unwrap();

        assert_eq!(outcome.new_entries.len(), 1);
        let entry = &outcome.new_entries[0];
        assert_eq!(entry.kind, MemoryKind::Soft);
        assert_eq!(entry.entity_type, EntityType::Character);
        assert_eq!(entry.entity_id, "c1");
        assert_eq!(entry.created_by, "learner");
        assert_eq!(entry.tags, vec!["temporal", "lore"]);

        let stored = memories
            .query(
                &EntityKey::new(EntityType::Character, "c1"),
                &MemoryFilter::new().current_only(),
            )
            .await
            .unwrap();
        assert_eq!(stored[0].id, entry.id);
    }

    #[tokio::test]
    async fn test_triggered_soft_memories_are_enhanced() {
        let (store, _, learner) = setup();
        let triggered = active(
            &store,
            NewMemory::new(EntityType::Character, "c1", "Fears deep water")
                .with_kind(MemoryKind::Soft)
                .with_tags(["ocean"]),
        );
        let hard = active(
            &store,
            NewMemory::new(EntityType::World, "w1", "The ocean swallowed the old city")
                .with_tags(["ocean"]),
        );
        let untouched = active(
            &store,
            NewMemory::new(EntityType::Region, "r1", "Forest paths twist")
                .with_kind(MemoryKind::Soft)
                .with_tags(["nature"]),
        );

        let outcome = learner
            .learn(
                "c1",
                "Will you sail with me?",
                "The ocean frightens me. I stay ashore.",
                &bundle(vec![triggered.clone(), hard.clone(), untouched.clone()]),
            )
            .await
            .unwrap();

        assert!(outcome.new_entries.is_empty());
        assert_eq!(outcome.updated_entries.len(), 1);
        let updated = &outcome.updated_entries[0];
        assert_eq!(updated.id, triggered.id);
        assert!(updated.used_recently);
        assert_eq!(
            updated.text,
            "Fears deep water [enhanced: The ocean frightens me]"
        );
        assert_eq!(updated.version, triggered.version);

        assert_eq!(store.get_entry(&hard.id).unwrap(), Some(hard));
        assert_eq!(store.get_entry(&untouched.id).unwrap(), Some(untouched));
    }

    #[tokio::test]
    async fn test_non_editable_memory_is_still_enhanced() {
        let (store, _, learner) = setup();
        let locked = store
            .create_entry(
                NewMemory::new(EntityType::Character, "c2", "Guards the northern gate")
                    .with_kind(MemoryKind::Soft),
            )
            .unwrap();
        let locked = store
            .update_entry(&locked.id, &MemoryUpdate::new().editable(false))
            .unwrap();

        let outcome = learner
            .learn("c2", "Who guards the northern road?", "Nobody.", &bundle(vec![locked.clone()]))
            .await
            .unwrap();

        assert_eq!(outcome.updated_entries.len(), 1);
        assert_eq!(
            outcome.updated_entries[0].text,
            "Guards the northern gate [enhanced: Nobody.]"
        );
        assert!(outcome.updated_entries[0].used_recently);
        assert!(!outcome.updated_entries[0].editable);
    }

    #[tokio::test]
    async fn test_connections_keep_strong_tag_overlap() {
        let (store, _, learner) = setup();
        let strong = active(
            &store,
            NewMemory::new(EntityType::World, "w1", "The old calendar")
                .with_kind(MemoryKind::Hard)
                .with_tags(["lore", "temporal", "plot"]),
        );
        let weak = active(
            &store,
            NewMemory::new(EntityType::World, "w1", "The harvest feast")
                .with_kind(MemoryKind::Hard)
                .with_tags(["lore", "joy", "nature", "location"]),
        );

        let outcome = learner
            .learn(
                "c1",
                "",
                "I remember the eclipse.",
                &bundle(vec![strong.clone(), weak]),
            )
            .await
            .unwrap();

        assert_eq!(outcome.connections.len(), 1);
        let connection = &outcome.connections[0];
        assert_eq!(connection.source_id, outcome.new_entries[0].id);
        assert_eq!(connection.target_id, strong.id);
        assert_eq!(connection.connection_type, ConnectionType::Semantic);
        assert!((connection.strength - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_learn_for_attaches_to_given_entity() {
        let (_, _, learner) = setup();
        let key = EntityKey::new(EntityType::Scene, "s1");

        let outcome = learner
            .learn_for(&key, "", "They swear an oath at the altar.", &bundle(vec![]))
            .await
            .unwrap();

        assert_eq!(outcome.new_entries[0].key(), key);
        assert_eq!(outcome.new_entries[0].tags, vec!["relationship", "plot"]);
    }

    #[tokio::test]
    async fn test_empty_interaction_learns_nothing() {
        let (_, _, learner) = setup();

        let outcome = learner.learn("c1", "", "", &bundle(vec![])).await.unwrap();

        assert!(outcome.is_empty());
        assert!(outcome.connections.is_empty());
    }
}

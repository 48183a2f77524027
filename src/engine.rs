//! The memory engine: one value wiring the store, cache, context builder,
//! templates, generation client and learner together.
//!
//! Every generation operation runs the same pipeline:
//! 1. BUILD: assemble the context bundle for the request
//! 2. RANK: re-rank the active memories against the request text
//! 3. RENDER: fill the active template for the operation
//! 4. GENERATE: call the generation client
//! 5. LEARN: turn the exchange into memory writes
//! 6. LOG: append the exchange to the interaction sink

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::cache::{CachedMemoryStore, MemoryCache, TtlMemoryCache};
use crate::config::EngineConfig;
use crate::context::{format_memories, ContextBuilder, ContextBundle, NarrativeSource, TagSource};
use crate::error::{Error, Result};
use crate::interaction::{InteractionRecord, InteractionSink, TracingSink};
use crate::learner::{Analyzer, InteractionLearner, KeywordAnalyzer};
use crate::llm::{CompletionRequest, LLMClient};
use crate::memory::{
    EntityKey, EntityType, MemoryEntry, MemoryFilter, MemoryId, MemoryStore, MemoryUpdate,
    NewMemory, SqliteMemoryStore,
};
use crate::prompt::{PromptTemplateEngine, TemplateKind, TemplateStore};
use crate::ranking::RelevanceRanker;

/// Reply from [`MemoryEngine::chat_with_character`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    pub memories_used: Vec<MemoryId>,
    pub detected_emotion: Option<String>,
}

/// Reply from [`MemoryEngine::continue_scene`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneContinuation {
    pub text: String,
    pub memories_used: Vec<MemoryId>,
    pub scene_suggestions: Vec<String>,
    pub character_actions: Vec<String>,
    pub plot_developments: Vec<String>,
}

/// Reply from [`MemoryEngine::generate_plot_suggestions`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotSuggestions {
    pub text: String,
    pub memories_used: Vec<MemoryId>,
    pub suggested_actions: Vec<String>,
}

/// Output of the shared generation pipeline.
struct Generation {
    text: String,
    memories_used: Vec<MemoryId>,
}

/// Memory and context engine. Construct once and share by reference.
pub struct MemoryEngine {
    config: EngineConfig,
    memories: CachedMemoryStore,
    narrative: Arc<dyn NarrativeSource>,
    context: ContextBuilder,
    templates: PromptTemplateEngine,
    ranker: RelevanceRanker,
    learner: InteractionLearner,
    llm: Arc<dyn LLMClient>,
    sink: Arc<dyn InteractionSink>,
}

impl MemoryEngine {
    pub fn builder() -> MemoryEngineBuilder {
        MemoryEngineBuilder::new()
    }

    /// Engine backed by one SQLite store for memories, tags, templates and
    /// the interaction log. Default tags and templates are seeded.
    pub fn sqlite(
        config: EngineConfig,
        narrative: Arc<dyn NarrativeSource>,
        llm: Arc<dyn LLMClient>,
    ) -> Result<Self> {
        let store = match config.database_path.as_deref() {
            Some(path) => SqliteMemoryStore::open(path)?,
            None => SqliteMemoryStore::in_memory()?,
        };
        store.seed_default_tags()?;
        store.seed_default_templates()?;

        let store = Arc::new(store);
        MemoryEngineBuilder::new()
            .config(config)
            .store(store.clone())
            .tags(store.clone())
            .templates(store.clone())
            .sink(store)
            .narrative(narrative)
            .llm(llm)
            .build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn memories(&self) -> &CachedMemoryStore {
        &self.memories
    }

    // ==================== Memory Management ====================

    pub async fn create_memory(&self, new: NewMemory) -> Result<MemoryEntry> {
        self.memories.create_entry(new).await
    }

    pub async fn batch_create_memories(&self, batch: Vec<NewMemory>) -> Result<Vec<MemoryEntry>> {
        self.memories.batch_create_entries(batch).await
    }

    pub async fn update_memory(&self, id: &MemoryId, update: &MemoryUpdate) -> Result<MemoryEntry> {
        self.memories.update_entry(id, update).await
    }

    pub async fn query_memories(
        &self,
        key: &EntityKey,
        filter: &MemoryFilter,
    ) -> Result<Vec<MemoryEntry>> {
        self.memories.query(key, filter).await
    }

    pub async fn build_context(
        &self,
        world_id: &str,
        character_id: Option<&str>,
        scene_id: Option<&str>,
    ) -> Result<ContextBundle> {
        self.context.build(world_id, character_id, scene_id).await
    }

    // ==================== Generation ====================

    /// Reply as a character. `scene_context`, when given, is used as the
    /// scene description for this turn.
    #[instrument(skip(self, message, scene_context))]
    pub async fn chat_with_character(
        &self,
        character_id: &str,
        message: &str,
        world_id: &str,
        scene_context: Option<&str>,
    ) -> Result<ChatResponse> {
        let character = self
            .narrative
            .character(character_id)
            .await?
            .ok_or_else(|| Error::not_found("character", character_id))?;

        let mut bundle = self.context.build(world_id, Some(character_id), None).await?;
        if let Some(scene) = scene_context {
            bundle.scene_context = scene.to_string();
        }

        let mut vars = HashMap::new();
        vars.insert("character_name".to_string(), character.name);
        vars.insert("message".to_string(), message.to_string());

        let key = EntityKey::new(EntityType::Character, character_id);
        let generation = self
            .generate(TemplateKind::CharacterChat, &key, &bundle, message, message, vars)
            .await?;
        let detected_emotion = self.learner.analyzer().detect_emotion(&generation.text);

        self.sink.record(
            InteractionRecord::new(character_id, world_id, message, generation.text.clone())
                .with_memories(generation.memories_used.clone())
                .with_emotion(detected_emotion.clone()),
        );

        Ok(ChatResponse {
            text: generation.text,
            memories_used: generation.memories_used,
            detected_emotion,
        })
    }

    #[instrument(skip(self, previous_dialogue))]
    pub async fn continue_scene(
        &self,
        scene_id: &str,
        previous_dialogue: &str,
        world_id: &str,
    ) -> Result<SceneContinuation> {
        if self.narrative.scene(scene_id).await?.is_none() {
            return Err(Error::not_found("scene", scene_id));
        }

        let bundle = self.context.build(world_id, None, Some(scene_id)).await?;

        let mut vars = HashMap::new();
        vars.insert("previous_dialogue".to_string(), previous_dialogue.to_string());

        let key = EntityKey::new(EntityType::Scene, scene_id);
        let generation = self
            .generate(
                TemplateKind::SceneContinuation,
                &key,
                &bundle,
                previous_dialogue,
                previous_dialogue,
                vars,
            )
            .await?;
        let suggestions = self.learner.analyzer().extract_suggestions(&generation.text);

        self.sink.record(
            InteractionRecord::new(scene_id, world_id, previous_dialogue, generation.text.clone())
                .with_memories(generation.memories_used.clone()),
        );

        Ok(SceneContinuation {
            text: generation.text,
            memories_used: generation.memories_used,
            scene_suggestions: suggestions.scene_suggestions,
            character_actions: suggestions.character_actions,
            plot_developments: suggestions.plot_developments,
        })
    }

    #[instrument(skip(self))]
    pub async fn generate_plot_suggestions(&self, world_id: &str) -> Result<PlotSuggestions> {
        if self.narrative.world(world_id).await?.is_none() {
            return Err(Error::not_found("world", world_id));
        }

        let bundle = self.context.build(world_id, None, None).await?;
        let request_text = bundle.world_context.clone();

        // The world description is ranking input, not something the user
        // said, so only the response is learned from
        let key = EntityKey::new(EntityType::World, world_id);
        let generation = self
            .generate(
                TemplateKind::PlotDevelopment,
                &key,
                &bundle,
                &request_text,
                "",
                HashMap::new(),
            )
            .await?;
        let suggestions = self.learner.analyzer().extract_suggestions(&generation.text);

        self.sink.record(
            InteractionRecord::new(world_id, world_id, request_text, generation.text.clone())
                .with_memories(generation.memories_used.clone()),
        );

        Ok(PlotSuggestions {
            text: generation.text,
            memories_used: generation.memories_used,
            suggested_actions: suggestions.suggested_actions,
        })
    }

    /// Rank against `request_text`, render, generate, then learn from
    /// `user_text` and the response.
    async fn generate(
        &self,
        kind: TemplateKind,
        key: &EntityKey,
        bundle: &ContextBundle,
        request_text: &str,
        user_text: &str,
        mut vars: HashMap<String, String>,
    ) -> Result<Generation> {
        let ranked: Vec<MemoryEntry> = self
            .ranker
            .rank(&bundle.active_memories, request_text, self.config.max_active_memories)
            .into_iter()
            .map(|scored| scored.entry)
            .collect();

        vars.insert("world_context".to_string(), bundle.world_context.clone());
        vars.insert("character_context".to_string(), bundle.character_context.clone());
        vars.insert("scene_context".to_string(), bundle.scene_context.clone());
        vars.insert("memory_context".to_string(), format_memories(&ranked));

        let prompt = self.templates.render(kind, &vars)?;

        let request = CompletionRequest::prompt(prompt)
            .with_model(self.config.default_model.clone())
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature);
        let response = self.llm.complete(request).await.map_err(|e| match e {
            Error::Generation { .. } => e,
            other => Error::generation(self.llm.provider(), other.to_string()),
        })?;

        let outcome = self
            .learner
            .learn_for(key, user_text, &response.content, bundle)
            .await?;

        info!(
            kind = %kind,
            key = %key,
            memories_used = ranked.len(),
            learned = outcome.new_entries.len(),
            "Generated"
        );

        Ok(Generation {
            text: response.content,
            memories_used: ranked.into_iter().map(|m| m.id).collect(),
        })
    }
}

/// Builder for [`MemoryEngine`] from injected collaborators.
#[derive(Default)]
pub struct MemoryEngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn MemoryStore>>,
    cache: Option<Arc<dyn MemoryCache>>,
    narrative: Option<Arc<dyn NarrativeSource>>,
    tags: Option<Arc<dyn TagSource>>,
    templates: Option<Arc<dyn TemplateStore>>,
    llm: Option<Arc<dyn LLMClient>>,
    sink: Option<Arc<dyn InteractionSink>>,
    analyzer: Option<Arc<dyn Analyzer>>,
}

impl MemoryEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to a [`TtlMemoryCache`] with the configured TTL.
    pub fn cache(mut self, cache: Arc<dyn MemoryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn narrative(mut self, narrative: Arc<dyn NarrativeSource>) -> Self {
        self.narrative = Some(narrative);
        self
    }

    pub fn tags(mut self, tags: Arc<dyn TagSource>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn templates(mut self, templates: Arc<dyn TemplateStore>) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn llm(mut self, llm: Arc<dyn LLMClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Defaults to [`TracingSink`].
    pub fn sink(mut self, sink: Arc<dyn InteractionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Defaults to [`KeywordAnalyzer`].
    pub fn analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn build(self) -> Result<MemoryEngine> {
        self.config.validate()?;

        let store = required(self.store, "store")?;
        let narrative = required(self.narrative, "narrative source")?;
        let tags = required(self.tags, "tag source")?;
        let templates = required(self.templates, "template store")?;
        let llm = required(self.llm, "generation client")?;

        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(TtlMemoryCache::new().with_ttl(self.config.cache_ttl())));
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));
        let analyzer = self
            .analyzer
            .unwrap_or_else(|| Arc::new(KeywordAnalyzer::new()));

        let memories = CachedMemoryStore::new(store, cache);
        let learner = InteractionLearner::new(memories.clone(), analyzer)
            .with_connection_threshold(self.config.connection_threshold);

        Ok(MemoryEngine {
            context: ContextBuilder::new(memories.clone(), narrative.clone(), tags),
            templates: PromptTemplateEngine::new(templates),
            ranker: RelevanceRanker::new(),
            config: self.config,
            memories,
            narrative,
            learner,
            llm,
            sink,
        })
    }
}

fn required<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| Error::Config(format!("{} is required", name)))
}

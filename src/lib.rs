//! # narrative-memory
//!
//! Versioned memory and context engine for AI-assisted storytelling.
//! Memories attach to narrative entities (characters, regions, worlds,
//! timeline events, scenes), get assembled into prompt context, and grow
//! from every generated interaction.
//!
//! ## Core Components
//!
//! - **Memory**: Versioned memory entries with exactly one current version per entity
//! - **Cache**: TTL cache in front of the store, invalidated on every write
//! - **Ranking**: Tag-boosted relevance scoring against request text
//! - **Context**: World, character and scene context bundles
//! - **Prompt**: Active templates per generation kind and placeholder rendering
//! - **Learner**: Keyword analysis that turns interactions into memories
//! - **Engine**: The build, render, generate, learn and log pipeline
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use narrative_memory::{
//!     AnthropicClient, ClientConfig, EngineConfig, MemoryEngine, StaticNarrativeSource,
//! };
//!
//! let llm = Arc::new(AnthropicClient::new(ClientConfig::from_env()?)?);
//! let narrative = Arc::new(StaticNarrativeSource::new());
//! let engine = MemoryEngine::sqlite(EngineConfig::from_env(), narrative, llm)?;
//!
//! let reply = engine.chat_with_character("c1", "Where are we going?", "w1", None).await?;
//! println!("{} ({:?})", reply.text, reply.detected_emotion);
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod interaction;
pub mod learner;
pub mod llm;
pub mod memory;
pub mod prompt;
pub mod ranking;

// Re-exports for convenience
pub use cache::{CachedMemoryStore, CacheStats, MemoryCache, TtlMemoryCache};
pub use config::EngineConfig;
pub use context::{
    CharacterRecord, ContextBuilder, ContextBundle, NarrativeSource, RegionRecord, SceneRecord,
    StaticNarrativeSource, TagSource, TimelineEventRecord, WorldRecord,
};
pub use engine::{
    ChatResponse, MemoryEngine, MemoryEngineBuilder, PlotSuggestions, SceneContinuation,
};
pub use error::{Error, Result};
pub use interaction::{InteractionRecord, InteractionSink, TracingSink};
pub use learner::{
    Analyzer, InteractionLearner, KeywordAnalyzer, LearningOutcome, MemoryConnection, Suggestions,
};
pub use llm::{AnthropicClient, ClientConfig, CompletionRequest, CompletionResponse, LLMClient};
pub use memory::{
    EntityKey, EntityType, MemoryEntry, MemoryFilter, MemoryId, MemoryKind, MemoryStore,
    MemoryTag, MemoryUpdate, NewMemory, SqliteMemoryStore, TagCategory,
};
pub use prompt::{PromptTemplate, PromptTemplateEngine, TemplateKind, TemplateStore};
pub use ranking::{RelevanceRanker, ScoredMemory};

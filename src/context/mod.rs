//! Context assembly for generation requests.
//!
//! A [`ContextBundle`] gathers the world, character and scene descriptions
//! from the application's narrative data together with the recently used
//! memories of the world and character, formatted for prompt rendering.
//!
//! ## Example
//!
//! ```rust,ignore
//! use narrative_memory::context::ContextBuilder;
//!
//! let builder = ContextBuilder::new(memories, narrative, tags);
//! let bundle = builder.build("w1", Some("c1"), None).await?;
//! println!("{}", bundle.memory_context);
//! ```

mod builder;
mod sources;
mod types;

pub use builder::{format_memories, ContextBuilder};
pub use sources::{NarrativeSource, StaticNarrativeSource, TagSource};
pub use types::{
    CharacterRecord, ContextBundle, RegionRecord, SceneRecord, TimelineEventRecord, WorldRecord,
};

//! Prompt templates and rendering.
//!
//! Each [`TemplateKind`] has at most one active template. Rendering replaces
//! `{name}` placeholders with caller-supplied variables; a placeholder with
//! no matching variable is emitted unchanged.

mod render;
mod store;
mod types;

pub use render::{placeholders, render_body, PromptTemplateEngine};
pub use store::TemplateStore;
pub use types::{PromptTemplate, TemplateKind};

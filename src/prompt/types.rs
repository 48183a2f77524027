//! Template kinds and stored prompt templates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

/// The generation scenario a template is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    SceneContinuation,
    CharacterChat,
    PlotDevelopment,
    WorldBuilding,
    DialogueGeneration,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 5] = [
        TemplateKind::SceneContinuation,
        TemplateKind::CharacterChat,
        TemplateKind::PlotDevelopment,
        TemplateKind::WorldBuilding,
        TemplateKind::DialogueGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::SceneContinuation => "scene_continuation",
            TemplateKind::CharacterChat => "character_chat",
            TemplateKind::PlotDevelopment => "plot_development",
            TemplateKind::WorldBuilding => "world_building",
            TemplateKind::DialogueGeneration => "dialogue_generation",
        }
    }

    /// Built-in body used when no template has been saved for this kind.
    pub fn default_body(&self) -> &'static str {
        match self {
            TemplateKind::SceneContinuation => {
                "You are continuing a scene in an ongoing story.\n\n\
                 {world_context}\n\n\
                 {scene_context}\n\n\
                 Established memories:\n{memory_context}\n\n\
                 Dialogue so far:\n{previous_dialogue}\n\n\
                 Continue the scene. Mark physical actions with *asterisks* and \
                 keep the established facts consistent."
            }
            TemplateKind::CharacterChat => {
                "You are {character_name}.\n\n\
                 {world_context}\n\n\
                 {character_context}\n\n\
                 {scene_context}\n\n\
                 What you remember:\n{memory_context}\n\n\
                 The user says: {message}\n\n\
                 Reply in character."
            }
            TemplateKind::PlotDevelopment => {
                "You are a story consultant.\n\n\
                 {world_context}\n\n\
                 Established memories:\n{memory_context}\n\n\
                 Suggest the next plot developments as a bulleted list."
            }
            TemplateKind::WorldBuilding => {
                "You are helping build a fictional world.\n\n\
                 {world_context}\n\n\
                 Established memories:\n{memory_context}\n\n\
                 Request: {message}"
            }
            TemplateKind::DialogueGeneration => {
                "Write dialogue for {character_name}.\n\n\
                 {character_context}\n\n\
                 {scene_context}\n\n\
                 What they remember:\n{memory_context}\n\n\
                 Prompt: {message}"
            }
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TemplateKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::invalid(format!("unknown template kind: {}", s)))
    }
}

/// A stored template. At most one template per kind is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    pub kind: TemplateKind,
    pub body: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl PromptTemplate {
    /// Create a new active template.
    pub fn new(kind: TemplateKind, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            body: body.into(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// One active built-in template per kind.
    pub fn defaults() -> Vec<PromptTemplate> {
        TemplateKind::ALL
            .into_iter()
            .map(|kind| PromptTemplate::new(kind, kind.default_body()))
            .collect()
    }
}

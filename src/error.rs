//! Error types for narrative-memory.

use thiserror::Error;

/// Result type alias using narrative-memory's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the memory and context engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing entity, template, tag or memory id
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// Bad entity type, memory kind, filter value or template kind
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Lost the race to become the current version of an entity.
    /// Re-issuing the create advances to the next version.
    #[error("Concurrent write conflict on {entity_type}:{entity_id}")]
    ConcurrencyConflict {
        entity_type: String,
        entity_id: String,
    },

    /// Text generation provider failure
    #[error("Generation error: {provider} - {message}")]
    Generation { provider: String, message: String },

    /// Store unreachable or query failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a not-found error.
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Create an invalid-argument error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a concurrency conflict error.
    pub fn conflict(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self::ConcurrencyConflict {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }

    /// Create a generation error.
    pub fn generation(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Generation {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether the caller may safely retry the operation once.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::not_found("memory", "abc");
        assert_eq!(err.to_string(), "memory not found: abc");

        let err = Error::conflict("character", "c1");
        assert_eq!(
            err.to_string(),
            "Concurrent write conflict on character:c1"
        );
    }

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(Error::conflict("world", "w1").is_retryable());
        assert!(!Error::not_found("template", "character_chat").is_retryable());
        assert!(!Error::generation("anthropic", "overloaded").is_retryable());
        assert!(!Error::Persistence("disk full".into()).is_retryable());
    }
}

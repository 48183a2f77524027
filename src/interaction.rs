//! Interaction log.
//!
//! Every generation call appends one record. Appends are fire-and-forget:
//! a failing sink is logged and never fails the request that produced it.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::memory::{conversion_error, parse_datetime, MemoryId, SqliteMemoryStore};

/// One prompt/response exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub entity_id: String,
    pub world_id: String,
    pub prompt: String,
    pub response: String,
    pub memories_used: Vec<MemoryId>,
    pub detected_emotion: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InteractionRecord {
    pub fn new(
        entity_id: impl Into<String>,
        world_id: impl Into<String>,
        prompt: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            world_id: world_id.into(),
            prompt: prompt.into(),
            response: response.into(),
            memories_used: Vec::new(),
            detected_emotion: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_memories(mut self, memories: Vec<MemoryId>) -> Self {
        self.memories_used = memories;
        self
    }

    pub fn with_emotion(mut self, emotion: Option<String>) -> Self {
        self.detected_emotion = emotion;
        self
    }
}

/// Append-only destination for interaction records.
pub trait InteractionSink: Send + Sync {
    fn record(&self, record: InteractionRecord);
}

/// Sink that only emits a debug event. Used when no log store is wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl InteractionSink for TracingSink {
    fn record(&self, record: InteractionRecord) {
        debug!(
            entity_id = %record.entity_id,
            world_id = %record.world_id,
            memories = record.memories_used.len(),
            emotion = ?record.detected_emotion,
            "Interaction"
        );
    }
}

impl SqliteMemoryStore {
    fn append_interaction(&self, record: &InteractionRecord) -> Result<()> {
        let memories = serde_json::to_string(&record.memories_used)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO interaction_log
                    (entity_id, world_id, prompt, response, memories_used, detected_emotion, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.entity_id,
                    record.world_id,
                    record.prompt,
                    record.response,
                    memories,
                    record.detected_emotion,
                    record.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Most recent interactions for an entity, newest first.
    pub fn recent_interactions(
        &self,
        entity_id: &str,
        limit: usize,
    ) -> Result<Vec<InteractionRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT entity_id, world_id, prompt, response, memories_used, detected_emotion, created_at
                 FROM interaction_log WHERE entity_id = ?1
                 ORDER BY id DESC LIMIT ?2",
            )?;
            let records = stmt
                .query_map(params![entity_id, limit as i64], |row| {
                    let memories: String = row.get(4)?;
                    Ok(InteractionRecord {
                        entity_id: row.get(0)?,
                        world_id: row.get(1)?,
                        prompt: row.get(2)?,
                        response: row.get(3)?,
                        memories_used: serde_json::from_str(&memories)
                            .map_err(|e| conversion_error(4, e))?,
                        detected_emotion: row.get(5)?,
                        created_at: parse_datetime(row.get::<_, String>(6)?),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
    }
}

impl InteractionSink for SqliteMemoryStore {
    fn record(&self, record: InteractionRecord) {
        match self.append_interaction(&record) {
            Ok(()) => debug!(entity_id = %record.entity_id, "Logged interaction"),
            Err(e) => warn!(entity_id = %record.entity_id, error = %e, "Failed to log interaction"),
        }
    }
}

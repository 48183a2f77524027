//! Template persistence.

use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use tracing::{debug, info};

use super::types::{PromptTemplate, TemplateKind};
use crate::error::Result;
use crate::memory::{conversion_error, parse_datetime, SqliteMemoryStore};

/// Lookup of the single active template per kind.
pub trait TemplateStore: Send + Sync {
    fn active_template(&self, kind: TemplateKind) -> Result<Option<PromptTemplate>>;
}

const TEMPLATE_COLUMNS: &str = "id, kind, body, is_active, created_at";

impl SqliteMemoryStore {
    // ==================== Template Operations ====================

    /// Store a template body. When `activate` is set, the previously active
    /// template of the same kind is deactivated in the same transaction.
    pub fn save_template(
        &self,
        kind: TemplateKind,
        body: &str,
        activate: bool,
    ) -> Result<PromptTemplate> {
        let mut template = PromptTemplate::new(kind, body);
        template.is_active = activate;

        self.with_conn(|conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
            if activate {
                tx.execute(
                    "UPDATE prompt_templates SET is_active = 0 WHERE kind = ?1 AND is_active = 1",
                    params![kind.as_str()],
                )?;
            }
            insert_template(&tx, &template)?;
            tx.commit()?;
            Ok(())
        })?;

        info!(kind = %kind, active = activate, "Saved prompt template");
        Ok(template)
    }

    /// Install the built-in template for every kind that has no active one.
    pub fn seed_default_templates(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
            let mut inserted = 0;
            for template in PromptTemplate::defaults() {
                if active_template_internal(&tx, template.kind)?.is_none() {
                    insert_template(&tx, &template)?;
                    inserted += 1;
                }
            }
            tx.commit()?;
            debug!(inserted, "Seeded default prompt templates");
            Ok(inserted)
        })
    }

    /// Every stored template of a kind, newest first.
    pub fn list_templates(&self, kind: TemplateKind) -> Result<Vec<PromptTemplate>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM prompt_templates WHERE kind = ?1
                 ORDER BY created_at DESC, rowid DESC",
                TEMPLATE_COLUMNS
            ))?;
            let templates = stmt
                .query_map(params![kind.as_str()], row_to_template)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(templates)
        })
    }
}

impl TemplateStore for SqliteMemoryStore {
    fn active_template(&self, kind: TemplateKind) -> Result<Option<PromptTemplate>> {
        self.with_conn(|conn| Ok(active_template_internal(conn, kind)?))
    }
}

fn insert_template(conn: &Connection, template: &PromptTemplate) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO prompt_templates (id, kind, body, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            template.id,
            template.kind.as_str(),
            template.body,
            template.is_active,
            template.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn active_template_internal(
    conn: &Connection,
    kind: TemplateKind,
) -> rusqlite::Result<Option<PromptTemplate>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM prompt_templates WHERE kind = ?1 AND is_active = 1",
            TEMPLATE_COLUMNS
        ),
        params![kind.as_str()],
        row_to_template,
    )
    .optional()
}

fn row_to_template(row: &rusqlite::Row) -> rusqlite::Result<PromptTemplate> {
    let kind: String = row.get(1)?;
    Ok(PromptTemplate {
        id: row.get(0)?,
        kind: kind.parse().map_err(|e| conversion_error(1, e))?,
        body: row.get(2)?,
        is_active: row.get(3)?,
        created_at: parse_datetime(row.get::<_, String>(4)?),
    })
}

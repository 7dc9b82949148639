//! Read side of the lexicon: senses, their owning entries, and embedding state.
//!
//! Entries and senses belong to the authoring surface. This module only reads them
//! and decides, per sense, whether its stored vector can still be trusted.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::{params, Row};

use crate::db::Db;
use crate::error::{LexigraphError, Result};

pub type SenseId = i64;
pub type EntryId = i64;

/// A single meaning of a lexical entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Sense {
    pub sense_id: SenseId,
    pub entry_id: EntryId,
    pub lemma: String,
    pub part_of_speech: String,
    pub definition: String,
    pub updated_at: DateTime<Utc>,
}

impl Sense {
    /// Text sent to the embedding service for this sense.
    pub fn embedding_input(&self) -> String {
        format!("{} ({}): {}", self.lemma, self.part_of_speech, self.definition.trim())
    }
}

/// Bookkeeping for a stored embedding (the vector itself stays in the database).
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingState {
    pub model: String,
    pub dimensions: usize,
    pub embedded_at: DateTime<Utc>,
    pub relations_scanned_at: Option<DateTime<Utc>>,
}

/// A sense together with the state of its embedding, if any.
#[derive(Debug, Clone)]
pub struct SenseRecord {
    pub sense: Sense,
    pub embedding: Option<EmbeddingState>,
}

impl SenseRecord {
    /// True when the stored vector was computed by `model` at `dimensions`
    /// no earlier than the sense's last edit.
    pub fn is_fresh(&self, model: &str, dimensions: usize) -> bool {
        match &self.embedding {
            Some(state) => {
                state.model == model
                    && state.dimensions == dimensions
                    && state.embedded_at >= self.sense.updated_at
            }
            None => false,
        }
    }

    pub fn needs_embedding(&self, model: &str, dimensions: usize) -> bool {
        !self.is_fresh(model, dimensions)
    }
}

const SENSE_COLUMNS: &str = "s.sense_id, s.entry_id, e.lemma, e.part_of_speech, s.definition, s.updated_at";

fn sense_from_row(row: &Row<'_>) -> Result<Sense> {
    let updated_at: String = row.get(5)?;
    Ok(Sense {
        sense_id: row.get(0)?,
        entry_id: row.get(1)?,
        lemma: row.get(2)?,
        part_of_speech: row.get(3)?,
        definition: row.get(4)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

/// Load every sense with its embedding state, ordered by sense id.
pub async fn load_senses(db: &Db) -> Result<Vec<SenseRecord>> {
    db.with_connection(|conn| {
        let sql = format!(
            "SELECT {}, emb.model, emb.dimensions, emb.embedded_at, emb.relations_scanned_at \
             FROM senses s \
             JOIN entries e ON e.entry_id = s.entry_id \
             LEFT JOIN sense_embeddings emb ON emb.sense_id = s.sense_id \
             ORDER BY s.sense_id",
            SENSE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let sense = sense_from_row(row)?;
            let model: Option<String> = row.get(6)?;
            let embedding = match model {
                Some(model) => {
                    let dimensions: i64 = row.get(7)?;
                    let embedded_at: String = row.get(8)?;
                    let scanned_at: Option<String> = row.get(9)?;
                    Some(EmbeddingState {
                        model,
                        dimensions: dimensions as usize,
                        embedded_at: parse_timestamp(&embedded_at)?,
                        relations_scanned_at: scanned_at.as_deref().map(parse_timestamp).transpose()?,
                    })
                }
                None => None,
            };
            records.push(SenseRecord { sense, embedding });
        }
        Ok(records)
    })
    .await
}

/// Fetch a single sense by id.
pub async fn get_sense(db: &Db, sense_id: SenseId) -> Result<Sense> {
    db.with_connection(move |conn| {
        let sql = format!(
            "SELECT {} FROM senses s JOIN entries e ON e.entry_id = s.entry_id WHERE s.sense_id = ?1",
            SENSE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![sense_id])?;
        match rows.next()? {
            Some(row) => sense_from_row(row),
            None => Err(LexigraphError::SenseNotFound(sense_id.to_string())),
        }
    })
    .await
}

/// Parse a stored timestamp.
///
/// Accepts RFC 3339 (what Lexigraph writes) and SQLite's `CURRENT_TIMESTAMP`
/// form `YYYY-MM-DD HH:MM:SS[.fff]`, which is taken as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| LexigraphError::Parse(format!("Invalid timestamp '{}': {}", value, e)))
}

/// Format a timestamp the way Lexigraph stores it.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

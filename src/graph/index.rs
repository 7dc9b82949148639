//! In-memory nearest-neighbor index over fresh sense embeddings.
//!
//! Loaded once per discovery pass; stale vectors are left out so retrieval never
//! ranks against text that has changed since it was embedded.

use std::collections::HashMap;

use crate::db::Db;
use crate::embeddings::decode_embedding;
use crate::error::Result;
use crate::lexicon::{parse_timestamp, EntryId, SenseId};

struct IndexedSense {
    sense_id: SenseId,
    entry_id: EntryId,
    vector: Vec<f32>,
}

/// Exact (full-scan) cosine index of sense vectors.
#[derive(Default)]
pub struct SenseIndex {
    senses: Vec<IndexedSense>,
    positions: HashMap<SenseId, usize>,
}

impl SenseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every fresh embedding computed with `model` at `dimensions`.
    pub async fn load(db: &Db, model: &str, dimensions: usize) -> Result<Self> {
        let model = model.to_string();
        let rows = db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT s.sense_id, s.entry_id, s.updated_at, emb.embedded_at, emb.embedding \
                     FROM sense_embeddings emb \
                     JOIN senses s ON s.sense_id = emb.sense_id \
                     WHERE emb.model = ?1 AND emb.dimensions = ?2",
                )?;
                let mut rows = stmt.query(rusqlite::params![model, dimensions as i64])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    let updated_at: String = row.get(2)?;
                    let embedded_at: String = row.get(3)?;
                    if parse_timestamp(&embedded_at)? < parse_timestamp(&updated_at)? {
                        continue;
                    }
                    let blob: Vec<u8> = row.get(4)?;
                    match decode_embedding(&blob) {
                        Some(vector) if vector.len() == dimensions => {
                            out.push((row.get::<_, SenseId>(0)?, row.get::<_, EntryId>(1)?, vector));
                        }
                        _ => log::warn!("Skipping malformed embedding for sense {}", row.get::<_, SenseId>(0)?),
                    }
                }
                Ok(out)
            })
            .await?;

        let mut index = Self::new();
        for (sense_id, entry_id, vector) in rows {
            index.insert(sense_id, entry_id, vector);
        }
        log::info!("Sense index loaded: {} fresh embeddings", index.len());
        Ok(index)
    }

    /// Add or replace a sense vector.
    pub fn insert(&mut self, sense_id: SenseId, entry_id: EntryId, vector: Vec<f32>) {
        let item = IndexedSense { sense_id, entry_id, vector };
        match self.positions.get(&sense_id) {
            Some(&pos) => self.senses[pos] = item,
            None => {
                self.positions.insert(sense_id, self.senses.len());
                self.senses.push(item);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.senses.len()
    }

    /// Stored vector for a sense, if indexed.
    pub fn vector(&self, sense_id: SenseId) -> Option<&[f32]> {
        self.positions.get(&sense_id).map(|&pos| self.senses[pos].vector.as_slice())
    }

    /// Top `k` senses by cosine similarity to `query`, most similar first.
    ///
    /// Senses owned by `exclude_entry` and `exclude_sense` itself are skipped. Ties
    /// break on ascending sense id so results are reproducible.
    pub fn nearest(
        &self,
        query: &[f32],
        exclude_entry: EntryId,
        exclude_sense: SenseId,
        k: usize,
    ) -> Vec<(SenseId, f32)> {
        let mut scored: Vec<(SenseId, f32)> = self
            .senses
            .iter()
            .filter(|s| s.entry_id != exclude_entry && s.sense_id != exclude_sense)
            .filter(|s| s.vector.len() == query.len())
            .map(|s| (s.sense_id, cosine_similarity(query, &s.vector)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }
}

/// Cosine similarity in [-1, 1]; 0.0 if either vector has zero magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

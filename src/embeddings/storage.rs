use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::db::Db;
use crate::error::Result;
use crate::lexicon::{format_timestamp, SenseId};

/// Encode a vector as a little-endian f32 BLOB
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a little-endian f32 BLOB; None if the length is not a multiple of 4
pub fn decode_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    blob.chunks(4)
        .map(|bytes| {
            let arr: [u8; 4] = bytes.try_into().ok()?;
            Some(f32::from_le_bytes(arr))
        })
        .collect()
}

/// Insert or replace the embeddings of several senses in one transaction.
///
/// Every row written gets `embedded_at` and a cleared `relations_scanned_at`, which
/// makes the sense eligible for relation discovery again.
///
/// # Returns
///
/// Number of embeddings stored
pub async fn upsert_embeddings_batch(
    db: &Db,
    model: &str,
    embeddings: Vec<(SenseId, Vec<f32>)>,
    embedded_at: DateTime<Utc>,
) -> Result<usize> {
    if embeddings.is_empty() {
        return Ok(0);
    }

    let model = model.to_string();
    let embedded_at = format_timestamp(embedded_at);

    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO sense_embeddings (
                    sense_id, model, dimensions, embedding, embedded_at, relations_scanned_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, NULL)
                ON CONFLICT(sense_id) DO UPDATE SET
                    model = excluded.model,
                    dimensions = excluded.dimensions,
                    embedding = excluded.embedding,
                    embedded_at = excluded.embedded_at,
                    relations_scanned_at = NULL
                "#,
            )?;
            for (sense_id, embedding) in &embeddings {
                count += stmt.execute(params![
                    sense_id,
                    model,
                    embedding.len() as i64,
                    encode_embedding(embedding),
                    embedded_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(count)
    })
    .await
}

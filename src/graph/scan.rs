//! Relation-scan checkpoints stored on the embedding row.

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::db::Db;
use crate::error::{LexigraphError, Result};
use crate::lexicon::{format_timestamp, SenseId, SenseRecord};

/// A sense is due for relation discovery when its vector is fresh and it has not
/// been scanned since that vector was computed.
pub fn is_scan_eligible(record: &SenseRecord, model: &str, dimensions: usize) -> bool {
    if !record.is_fresh(model, dimensions) {
        return false;
    }
    match &record.embedding {
        Some(state) => match state.relations_scanned_at {
            None => true,
            Some(scanned_at) => state.embedded_at > scanned_at,
        },
        None => false,
    }
}

/// Record that every candidate of `sense_id` has been processed.
pub async fn mark_scanned(db: &Db, sense_id: SenseId, at: DateTime<Utc>) -> Result<()> {
    let at = format_timestamp(at);
    let updated = db
        .with_connection(move |conn| {
            Ok(conn.execute(
                "UPDATE sense_embeddings SET relations_scanned_at = ?1 WHERE sense_id = ?2",
                params![at, sense_id],
            )?)
        })
        .await?;

    if updated == 0 {
        return Err(LexigraphError::SenseNotFound(sense_id.to_string()));
    }
    Ok(())
}

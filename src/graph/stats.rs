//! Summary counts over the lexicon, its embeddings, and the relation graph.

use std::collections::BTreeMap;

use crate::db::Db;
use crate::error::Result;
use crate::graph::is_scan_eligible;
use crate::lexicon::load_senses;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct GraphStats {
    pub senses: usize,
    pub fresh_embeddings: usize,
    pub stale_embeddings: usize,
    pub missing_embeddings: usize,
    pub scan_eligible: usize,
    pub edges_by_type: BTreeMap<String, usize>,
    pub edges_by_provenance: BTreeMap<String, usize>,
    pub edges_by_status: BTreeMap<String, usize>,
}

impl GraphStats {
    pub fn total_edges(&self) -> usize {
        self.edges_by_type.values().sum()
    }
}

async fn count_by(db: &Db, column: &'static str) -> Result<BTreeMap<String, usize>> {
    db.with_connection(move |conn| {
        let sql = format!("SELECT {0}, COUNT(*) FROM sense_relations GROUP BY {0}", column);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut counts = BTreeMap::new();
        while let Some(row) = rows.next()? {
            counts.insert(row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize);
        }
        Ok(counts)
    })
    .await
}

/// Collect statistics for the configured embedding model.
pub async fn graph_stats(db: &Db, model: &str, dimensions: usize) -> Result<GraphStats> {
    let records = load_senses(db).await?;
    let mut stats = GraphStats {
        senses: records.len(),
        ..GraphStats::default()
    };

    for record in &records {
        if record.embedding.is_none() {
            stats.missing_embeddings += 1;
        } else if record.is_fresh(model, dimensions) {
            stats.fresh_embeddings += 1;
        } else {
            stats.stale_embeddings += 1;
        }
        if is_scan_eligible(record, model, dimensions) {
            stats.scan_eligible += 1;
        }
    }

    stats.edges_by_type = count_by(db, "relation_type").await?;
    stats.edges_by_provenance = count_by(db, "provenance").await?;
    stats.edges_by_status = count_by(db, "status").await?;

    Ok(stats)
}

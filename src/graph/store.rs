//! Row mapping and writes for the sense_relations table.

use rusqlite::{params, Connection, Row};

use crate::db::Db;
use crate::error::Result;
use crate::graph::RelationEdge;

pub(crate) const EDGE_COLUMNS: &str =
    "relation_id, source_sense_id, target_sense_id, relation_type, strength, rationale, provenance, status";

pub(crate) fn edge_from_row(row: &Row<'_>) -> Result<RelationEdge> {
    let relation_type: String = row.get(3)?;
    let strength: i64 = row.get(4)?;
    let provenance: String = row.get(6)?;
    let status: String = row.get(7)?;
    Ok(RelationEdge {
        relation_id: row.get(0)?,
        source_sense_id: row.get(1)?,
        target_sense_id: row.get(2)?,
        relation_type: relation_type.parse()?,
        strength: strength.clamp(0, 100) as u8,
        rationale: row.get(5)?,
        provenance: provenance.parse()?,
        status: status.parse()?,
    })
}

/// Insert an edge unless a uniqueness constraint already covers it.
///
/// Returns false when the insert was a no-op, which is how concurrent runs that
/// race on the same pair settle.
pub(crate) fn insert_edge(conn: &Connection, edge: &RelationEdge) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO sense_relations (
            relation_id, source_sense_id, target_sense_id, relation_type,
            strength, rationale, provenance, status, pair_key
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            edge.relation_id,
            edge.source_sense_id,
            edge.target_sense_id,
            edge.relation_type.as_str(),
            edge.strength as i64,
            edge.rationale,
            edge.provenance.as_str(),
            edge.status.as_str(),
            edge.pair_key().as_str(),
        ],
    )?;
    Ok(inserted > 0)
}

/// Every edge in the graph, oldest first.
pub async fn list_edges(db: &Db) -> Result<Vec<RelationEdge>> {
    db.with_connection(|conn| {
        let sql = format!("SELECT {} FROM sense_relations ORDER BY created_at, relation_id", EDGE_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next()? {
            edges.push(edge_from_row(row)?);
        }
        Ok(edges)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Provenance, RelationType, VerificationStatus};
    use crate::testing::{insert_entry, insert_sense, setup_test_db};

    fn edge(id: &str, source: i64, target: i64, provenance: Provenance) -> RelationEdge {
        RelationEdge {
            relation_id: id.to_string(),
            source_sense_id: source,
            target_sense_id: target,
            relation_type: RelationType::Synonym,
            strength: 80,
            rationale: "same meaning".to_string(),
            provenance,
            status: VerificationStatus::Unverified,
        }
    }

    async fn seed(db: &Db) {
        for i in 1..=3 {
            let entry = insert_entry(db, i, &format!("w{}", i), "noun").await;
            insert_sense(db, i, entry, "d").await;
        }
    }

    #[tokio::test]
    async fn test_insert_and_list() {
        let (db, _temp) = setup_test_db().await;
        seed(&db).await;
        let e = edge("r1", 1, 2, Provenance::Machine);
        let inserted = db
            .with_connection(move |conn| insert_edge(conn, &e))
            .await
            .unwrap();
        assert!(inserted);

        let edges = list_edges(&db).await.unwrap();
        assert_eq!(edges, vec![edge("r1", 1, 2, Provenance::Machine)]);
    }

    #[tokio::test]
    async fn test_second_machine_edge_for_pair_is_ignored() {
        let (db, _temp) = setup_test_db().await;
        seed(&db).await;
        let (inserted_a, inserted_b) = db
            .with_connection(|conn| {
                let a = insert_edge(conn, &edge("r1", 1, 2, Provenance::Machine))?;
                let mut reverse = edge("r2", 2, 1, Provenance::Machine);
                reverse.relation_type = RelationType::Antonym;
                let b = insert_edge(conn, &reverse)?;
                Ok((a, b))
            })
            .await
            .unwrap();
        assert!(inserted_a);
        assert!(!inserted_b);
        assert_eq!(list_edges(&db).await.unwrap().len(), 1);
    }
}

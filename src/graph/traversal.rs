//! BFS graph traversal over sense_relations.

use std::collections::{HashSet, VecDeque};

use crate::db::Db;
use crate::error::Result;
use crate::graph::store::{edge_from_row, EDGE_COLUMNS};
use crate::graph::{RelationEdge, RelationType};
use crate::lexicon::SenseId;

/// Traverse outgoing edges from `start` using BFS.
/// Returns all edges discovered within max_depth hops, each target visited once.
pub async fn traverse_graph(
    db: &Db,
    start: SenseId,
    relation_types: Option<Vec<RelationType>>,
    max_depth: usize,
) -> Result<Vec<RelationEdge>> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    let mut result = Vec::new();

    queue.push_back((start, 0));
    visited.insert(start);

    while let Some((sense_id, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }

        for edge in outgoing_edges(db, sense_id, relation_types.clone()).await? {
            if visited.insert(edge.target_sense_id) {
                queue.push_back((edge.target_sense_id, depth + 1));
                result.push(edge);
            }
        }
    }

    Ok(result)
}

async fn outgoing_edges(
    db: &Db,
    sense_id: SenseId,
    relation_types: Option<Vec<RelationType>>,
) -> Result<Vec<RelationEdge>> {
    db.with_connection(move |conn| {
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(sense_id)];
        let mut query = format!("SELECT {} FROM sense_relations WHERE source_sense_id = ?", EDGE_COLUMNS);
        if let Some(types) = &relation_types {
            let placeholders = types.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            query.push_str(&format!(" AND relation_type IN ({})", placeholders));
            for t in types {
                params.push(Box::new(t.as_str()));
            }
        }
        query.push_str(" ORDER BY strength DESC, target_sense_id");

        let mut stmt = conn.prepare(&query)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(edge_from_row(row)?);
        }
        Ok(out)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{insert_entry, insert_human_edge, insert_sense, setup_test_db};
    use tempfile::TempDir;

    async fn setup_test_db_with_relations() -> (Db, TempDir) {
        let (db, temp_dir) = setup_test_db().await;
        for i in 1..=4 {
            let entry = insert_entry(&db, i, &format!("w{}", i), "noun").await;
            insert_sense(&db, i, entry, "d").await;
        }
        // 1 -> 2 -> 3, 1 -> 4
        insert_human_edge(&db, 1, 2, RelationType::Hypernym).await;
        insert_human_edge(&db, 2, 3, RelationType::Hypernym).await;
        insert_human_edge(&db, 1, 4, RelationType::Synonym).await;
        (db, temp_dir)
    }

    #[tokio::test]
    async fn test_traverse_single_hop() {
        let (db, _temp) = setup_test_db_with_relations().await;
        let edges = traverse_graph(&db, 1, None, 1).await.unwrap();
        let mut targets: Vec<_> = edges.iter().map(|e| e.target_sense_id).collect();
        targets.sort();
        assert_eq!(targets, vec![2, 4]);
    }

    #[tokio::test]
    async fn test_traverse_multi_hop() {
        let (db, _temp) = setup_test_db_with_relations().await;
        let edges = traverse_graph(&db, 1, None, 3).await.unwrap();
        assert_eq!(edges.len(), 3);
        assert!(edges.iter().any(|e| e.source_sense_id == 2 && e.target_sense_id == 3));
    }

    #[tokio::test]
    async fn test_traverse_depth_zero() {
        let (db, _temp) = setup_test_db_with_relations().await;
        assert!(traverse_graph(&db, 1, None, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_traverse_relation_type_filter() {
        let (db, _temp) = setup_test_db_with_relations().await;
        let edges = traverse_graph(&db, 1, Some(vec![RelationType::Hypernym]), 3).await.unwrap();
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| e.relation_type == RelationType::Hypernym));
    }

    #[tokio::test]
    async fn test_traverse_cycle_terminates() {
        let (db, _temp) = setup_test_db_with_relations().await;
        insert_human_edge(&db, 3, 1, RelationType::Meronym).await;
        let edges = traverse_graph(&db, 1, None, 10).await.unwrap();
        assert_eq!(edges.len(), 3);
    }
}

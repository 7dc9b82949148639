//! Embedding refresh: re-embed every sense whose vector is missing or stale.
//!
//! Stale senses are split into fixed-size batches and dispatched to the embedding
//! service with bounded concurrency. A batch that fails (transport error, timeout,
//! wrong vector count, wrong dimension) is logged and its senses are reported as
//! unresolved; the rest of the run continues and nothing is retried until the next run.

use chrono::Utc;
use futures_util::stream::{self, StreamExt};

use crate::config::EmbeddingsConfig;
use crate::db::Db;
use crate::embeddings::openai::MAX_BATCH_SIZE;
use crate::embeddings::{upsert_embeddings_batch, EmbeddingService};
use crate::error::{LexigraphError, Result};
use crate::lexicon::{load_senses, Sense, SenseId};

/// Outcome counters of one refresh pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    /// Senses that needed a new vector at the start of the pass
    pub stale: usize,
    pub refreshed: usize,
    pub unresolved: usize,
    pub failed_batches: usize,
}

enum BatchOutcome {
    Stored(usize),
    Failed(Vec<SenseId>),
}

/// Bring every sense's embedding up to date.
pub async fn refresh_embeddings(
    db: &Db,
    service: &dyn EmbeddingService,
    settings: &EmbeddingsConfig,
) -> Result<RefreshReport> {
    let stale: Vec<Sense> = load_senses(db)
        .await?
        .into_iter()
        .filter(|record| record.needs_embedding(&settings.model, settings.dimensions))
        .map(|record| record.sense)
        .collect();

    let mut report = RefreshReport {
        stale: stale.len(),
        ..RefreshReport::default()
    };

    if stale.is_empty() {
        log::info!("All sense embeddings are fresh");
        return Ok(report);
    }

    let batch_size = settings.batch_size.clamp(1, MAX_BATCH_SIZE);
    let batches: Vec<Vec<Sense>> = stale.chunks(batch_size).map(|c| c.to_vec()).collect();
    log::info!(
        "Refreshing {} sense embeddings in {} batches (model={}, concurrency={})",
        stale.len(),
        batches.len(),
        settings.model,
        settings.max_concurrency
    );

    let outcomes: Vec<Result<BatchOutcome>> = stream::iter(batches)
        .map(|batch| embed_batch(db, service, settings, batch))
        .buffer_unordered(settings.max_concurrency.max(1))
        .collect()
        .await;

    for outcome in outcomes {
        match outcome? {
            BatchOutcome::Stored(count) => report.refreshed += count,
            BatchOutcome::Failed(sense_ids) => {
                report.failed_batches += 1;
                report.unresolved += sense_ids.len();
            }
        }
    }

    if report.unresolved > 0 {
        log::warn!(
            "{} sense embeddings unresolved after {} failed batches",
            report.unresolved,
            report.failed_batches
        );
    }

    Ok(report)
}

/// Embed and store one batch. Service failures and senses deleted mid-call become
/// `Failed`; other database errors propagate.
async fn embed_batch(
    db: &Db,
    service: &dyn EmbeddingService,
    settings: &EmbeddingsConfig,
    batch: Vec<Sense>,
) -> Result<BatchOutcome> {
    let sense_ids: Vec<SenseId> = batch.iter().map(|s| s.sense_id).collect();
    let texts: Vec<String> = batch.iter().map(Sense::embedding_input).collect();
    let requested_at = Utc::now();

    let vectors = match tokio::time::timeout(settings.timeout(), service.embed(texts)).await {
        Ok(Ok(vectors)) => vectors,
        Ok(Err(e)) => {
            log::warn!("Embedding batch failed for senses {:?}: {}", sense_ids, e);
            return Ok(BatchOutcome::Failed(sense_ids));
        }
        Err(_) => {
            log::warn!(
                "Embedding batch timed out after {:?} for senses {:?}",
                settings.timeout(),
                sense_ids
            );
            return Ok(BatchOutcome::Failed(sense_ids));
        }
    };

    if let Err(e) = check_batch(&vectors, sense_ids.len(), settings.dimensions) {
        log::warn!("Rejecting embedding batch for senses {:?}: {}", sense_ids, e);
        return Ok(BatchOutcome::Failed(sense_ids));
    }

    let pairs: Vec<(SenseId, Vec<f32>)> = sense_ids.iter().copied().zip(vectors).collect();
    let stored = match upsert_embeddings_batch(db, &settings.model, pairs, requested_at).await {
        Ok(stored) => stored,
        Err(e) if e.is_foreign_key_violation() => {
            log::warn!("Senses {:?} changed during embedding, batch left for the next run", sense_ids);
            return Ok(BatchOutcome::Failed(sense_ids));
        }
        Err(e) => return Err(e),
    };
    log::debug!("Stored {} sense embeddings", stored);
    Ok(BatchOutcome::Stored(stored))
}

fn check_batch(vectors: &[Vec<f32>], expected: usize, dimensions: usize) -> Result<()> {
    if vectors.len() != expected {
        return Err(LexigraphError::Embedding(format!(
            "Expected {} vectors, got {}",
            expected,
            vectors.len()
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
        return Err(LexigraphError::Embedding(format!(
            "Expected dimension {}, got {}",
            dimensions,
            bad.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::load_senses;
    use crate::testing::{
        delete_sense, embeddings_config, insert_entry, insert_sense, setup_test_db, touch_sense, FakeEmbedder,
    };
    use async_trait::async_trait;
    use std::sync::atomic::Ordering;

    struct DeletingEmbedder {
        db: Db,
        victim: SenseId,
    }

    #[async_trait]
    impl EmbeddingService for DeletingEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            delete_sense(&self.db, self.victim).await;
            Ok(vec![vec![1.0, 0.0, 0.0]; texts.len()])
        }
    }

    async fn seed_six(db: &Db) {
        for i in 1..=6 {
            let entry = insert_entry(db, i, &format!("word{}", i), "noun").await;
            insert_sense(db, i, entry, &format!("definition {}", i)).await;
        }
    }

    #[test]
    fn test_check_batch() {
        assert!(check_batch(&[vec![0.0; 3], vec![0.0; 3]], 2, 3).is_ok());
        assert!(check_batch(&[vec![0.0; 3]], 2, 3).is_err());
        assert!(check_batch(&[vec![0.0; 3], vec![0.0; 4]], 2, 3).is_err());
    }

    #[tokio::test]
    async fn test_refresh_makes_every_sense_fresh() {
        let (db, _temp) = setup_test_db().await;
        seed_six(&db).await;
        let settings = embeddings_config();
        let embedder = FakeEmbedder::new();

        let report = refresh_embeddings(&db, &embedder, &settings).await.unwrap();
        assert_eq!(report.stale, 6);
        assert_eq!(report.refreshed, 6);
        assert_eq!(report.unresolved, 0);
        // batch_size = 2
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);

        let records = load_senses(&db).await.unwrap();
        for record in &records {
            assert!(record.is_fresh(&settings.model, settings.dimensions));
            let state = record.embedding.as_ref().unwrap();
            assert!(state.embedded_at >= record.sense.updated_at);
        }
    }

    #[tokio::test]
    async fn test_second_refresh_does_nothing() {
        let (db, _temp) = setup_test_db().await;
        seed_six(&db).await;
        let settings = embeddings_config();
        let embedder = FakeEmbedder::new();

        refresh_embeddings(&db, &embedder, &settings).await.unwrap();
        let calls = embedder.calls.load(Ordering::SeqCst);

        let report = refresh_embeddings(&db, &embedder, &settings).await.unwrap();
        assert_eq!(report, RefreshReport::default());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_edited_sense_is_reembedded() {
        let (db, _temp) = setup_test_db().await;
        seed_six(&db).await;
        let settings = embeddings_config();
        let embedder = FakeEmbedder::new();
        refresh_embeddings(&db, &embedder, &settings).await.unwrap();

        touch_sense(&db, 3, "an edited definition").await;

        let report = refresh_embeddings(&db, &embedder, &settings).await.unwrap();
        assert_eq!(report.stale, 1);
        assert_eq!(report.refreshed, 1);
    }

    #[tokio::test]
    async fn test_malformed_batch_leaves_senses_unresolved() {
        let (db, _temp) = setup_test_db().await;
        seed_six(&db).await;
        let settings = embeddings_config();
        // Senses 3 and 4 share the second batch; the fake drops one vector for it.
        let embedder = FakeEmbedder::new().malformed_when_contains("definition 3");

        let report = refresh_embeddings(&db, &embedder, &settings).await.unwrap();
        assert_eq!(report.refreshed, 4);
        assert_eq!(report.unresolved, 2);
        assert_eq!(report.failed_batches, 1);

        let records = load_senses(&db).await.unwrap();
        let stale: Vec<SenseId> = records
            .iter()
            .filter(|r| r.needs_embedding(&settings.model, settings.dimensions))
            .map(|r| r.sense.sense_id)
            .collect();
        assert_eq!(stale, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_service_error_is_absorbed() {
        let (db, _temp) = setup_test_db().await;
        seed_six(&db).await;
        let settings = embeddings_config();
        let embedder = FakeEmbedder::new().failing_when_contains("definition 6");

        let report = refresh_embeddings(&db, &embedder, &settings).await.unwrap();
        assert_eq!(report.refreshed, 4);
        assert_eq!(report.unresolved, 2);
    }

    #[tokio::test]
    async fn test_sense_deleted_during_embedding() {
        let (db, _temp) = setup_test_db().await;
        seed_six(&db).await;
        let settings = embeddings_config();
        let embedder = DeletingEmbedder { db: db.clone(), victim: 3 };

        let report = refresh_embeddings(&db, &embedder, &settings).await.unwrap();
        assert_eq!(report.refreshed, 4);
        assert_eq!(report.unresolved, 2);
        assert_eq!(report.failed_batches, 1);

        let records = load_senses(&db).await.unwrap();
        assert_eq!(records.len(), 5);
        let stale: Vec<SenseId> = records
            .iter()
            .filter(|r| r.needs_embedding(&settings.model, settings.dimensions))
            .map(|r| r.sense.sense_id)
            .collect();
        assert_eq!(stale, vec![4]);
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejected() {
        let (db, _temp) = setup_test_db().await;
        seed_six(&db).await;
        let mut settings = embeddings_config();
        settings.dimensions = 8;

        let report = refresh_embeddings(&db, &FakeEmbedder::new(), &settings).await.unwrap();
        assert_eq!(report.refreshed, 0);
        assert_eq!(report.unresolved, 6);
        assert_eq!(report.failed_batches, 3);
    }
}

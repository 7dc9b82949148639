//! One discovery run: refresh stale embeddings, then scan every eligible sense
//! for new relations.
//!
//! Senses are processed one at a time and oracle calls are sequential with a
//! configurable pause between them. A sense is checkpointed only after all of its
//! candidates were handled, so an interrupted run resumes where it stopped.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::db::Db;
use crate::embeddings::{refresh_embeddings, EmbeddingService, RefreshReport};
use crate::error::{LexigraphError, Result};
use crate::graph::{
    is_scan_eligible, mark_scanned, retrieve_candidates, AcceptancePolicy, EdgeLedger, MutationOutcome, PairKey,
    RelationClassifier, RelationOracle, SenseIndex, SkipReason, Verdict,
};
use crate::lexicon::{load_senses, Sense, SenseId};

/// Counters of one relation discovery pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Senses due for a scan when the pass started
    pub eligible: usize,
    pub senses_scanned: usize,
    /// Senses left unmarked because an oracle call failed
    pub senses_deferred: usize,
    pub pairs_classified: usize,
    pub edges_created: usize,
    pub skipped_no_relation: usize,
    pub skipped_unparseable: usize,
    pub skipped_unavailable: usize,
    pub skipped_disallowed: usize,
    pub skipped_low_confidence: usize,
    pub skipped_duplicate: usize,
    pub skipped_self_loop: usize,
    pub skipped_missing_sense: usize,
    pub interrupted: bool,
}

impl DiscoveryReport {
    fn record(&mut self, outcome: &MutationOutcome) {
        match outcome {
            MutationOutcome::Created(_) => self.edges_created += 1,
            MutationOutcome::Skipped(reason) => match reason {
                SkipReason::NoRelation => self.skipped_no_relation += 1,
                SkipReason::Unparseable => self.skipped_unparseable += 1,
                SkipReason::Unavailable => self.skipped_unavailable += 1,
                SkipReason::Disallowed => self.skipped_disallowed += 1,
                SkipReason::LowConfidence => self.skipped_low_confidence += 1,
                SkipReason::Duplicate => self.skipped_duplicate += 1,
                SkipReason::SelfLoop => self.skipped_self_loop += 1,
                SkipReason::MissingSense => self.skipped_missing_sense += 1,
            },
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub refresh: RefreshReport,
    pub discovery: DiscoveryReport,
}

impl RunSummary {
    pub fn log(&self) {
        let r = &self.refresh;
        let d = &self.discovery;
        log::info!(
            "Embeddings: {} stale, {} refreshed, {} unresolved ({} failed batches)",
            r.stale,
            r.refreshed,
            r.unresolved,
            r.failed_batches
        );
        log::info!(
            "Discovery: {} eligible, {} scanned, {} deferred, {} pairs classified, {} new edges",
            d.eligible,
            d.senses_scanned,
            d.senses_deferred,
            d.pairs_classified,
            d.edges_created
        );
        log::info!(
            "Skipped pairs: none={} unparseable={} unavailable={} disallowed={} low_confidence={} duplicate={} deleted={}",
            d.skipped_no_relation,
            d.skipped_unparseable,
            d.skipped_unavailable,
            d.skipped_disallowed,
            d.skipped_low_confidence,
            d.skipped_duplicate,
            d.skipped_missing_sense
        );
        if d.interrupted {
            log::warn!("Run interrupted; remaining senses will be scanned next run");
        }
    }
}

pub struct Pipeline<'a> {
    db: &'a Db,
    config: &'a Config,
    stop: Arc<AtomicBool>,
}

impl<'a> Pipeline<'a> {
    pub fn new(db: &'a Db, config: &'a Config) -> Self {
        Self {
            db,
            config,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a flag that, once set, ends the run before the next sense.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub async fn run(
        &self,
        embedder: &dyn EmbeddingService,
        oracle: &dyn RelationOracle,
        limit: Option<usize>,
    ) -> Result<RunSummary> {
        let refresh = self.refresh(embedder).await?;
        let discovery = self.discover(oracle, limit).await?;
        let summary = RunSummary { refresh, discovery };
        summary.log();
        Ok(summary)
    }

    pub async fn refresh(&self, embedder: &dyn EmbeddingService) -> Result<RefreshReport> {
        refresh_embeddings(self.db, embedder, &self.config.embeddings).await
    }

    /// Scan eligible senses in id order, at most `limit` of them.
    ///
    /// `limit` overrides `discovery.max_senses_per_run`.
    pub async fn discover(&self, oracle: &dyn RelationOracle, limit: Option<usize>) -> Result<DiscoveryReport> {
        let settings = &self.config.discovery;
        let model = &self.config.embeddings.model;
        let dimensions = self.config.embeddings.dimensions;

        let records = load_senses(self.db).await?;
        let index = SenseIndex::load(self.db, model, dimensions).await?;
        let mut ledger = EdgeLedger::load(self.db).await?;
        let policy = AcceptancePolicy::from_config(settings);
        let classifier = RelationClassifier::new(oracle, settings.allowed_relations.clone(), settings.timeout());

        let mut sources: Vec<Sense> = Vec::new();
        let mut senses: HashMap<SenseId, Sense> = HashMap::with_capacity(records.len());
        for record in records {
            if is_scan_eligible(&record, model, dimensions) {
                sources.push(record.sense.clone());
            }
            senses.insert(record.sense.sense_id, record.sense);
        }

        let mut report = DiscoveryReport {
            eligible: sources.len(),
            ..DiscoveryReport::default()
        };
        if let Some(limit) = limit.or(settings.max_senses_per_run) {
            sources.truncate(limit);
        }

        log::info!(
            "Scanning {} of {} eligible senses ({} indexed vectors, {} linked pairs)",
            sources.len(),
            report.eligible,
            index.len(),
            ledger.len()
        );

        // Pairs already put to the oracle in this run, in either direction
        let mut classified: HashSet<PairKey> = HashSet::new();
        let mut oracle_called = false;

        for source in &sources {
            if self.stop.load(Ordering::SeqCst) {
                report.interrupted = true;
                break;
            }

            let candidates = retrieve_candidates(&index, &ledger, source, settings.top_k, settings.min_similarity);
            let mut deferred = false;

            for candidate in candidates {
                let pair = PairKey::new(source.sense_id, candidate.sense_id);
                if classified.contains(&pair) {
                    continue;
                }
                let Some(target) = senses.get(&candidate.sense_id) else {
                    continue;
                };

                if oracle_called && !settings.request_delay().is_zero() {
                    tokio::time::sleep(settings.request_delay()).await;
                }
                oracle_called = true;

                log::debug!(
                    "Classifying {} -> {} (similarity {:.3})",
                    source.sense_id,
                    target.sense_id,
                    candidate.similarity
                );
                let verdict = classifier.classify(source, target).await;
                classified.insert(pair);
                report.pairs_classified += 1;
                if matches!(verdict, Verdict::Unavailable { .. }) {
                    deferred = true;
                }

                let outcome = ledger
                    .apply(self.db, &policy, source.sense_id, target.sense_id, &verdict)
                    .await?;
                report.record(&outcome);
            }

            if deferred {
                log::warn!("Sense {} left unscanned after oracle failures", source.sense_id);
                report.senses_deferred += 1;
                continue;
            }

            match mark_scanned(self.db, source.sense_id, Utc::now()).await {
                Ok(()) => report.senses_scanned += 1,
                Err(LexigraphError::SenseNotFound(id)) => {
                    log::warn!("Sense {} disappeared during the run", id);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }
}

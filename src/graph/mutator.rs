//! Acceptance of classified pairs into the relation graph.
//!
//! The ledger holds one direction-independent key per linked pair, loaded from the
//! edge table once per run and extended as edges are created. A single lookup
//! answers "is A linked to B in either direction", so there is no window between
//! two directional checks.

use std::collections::HashSet;
use uuid::Uuid;

use crate::config::DiscoveryConfig;
use crate::db::Db;
use crate::error::Result;
use crate::graph::store::insert_edge;
use crate::graph::{
    strength_from_confidence, PairKey, Provenance, RelationEdge, RelationType, VerificationStatus, Verdict,
};
use crate::lexicon::SenseId;

/// Why a classified pair produced no edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The oracle answered "none".
    NoRelation,
    Unparseable,
    Unavailable,
    /// A relation outside the configured allow-list.
    Disallowed,
    LowConfidence,
    /// The pair already carries an edge (either direction, any provenance).
    Duplicate,
    SelfLoop,
    /// One of the senses was deleted after the run started.
    MissingSense,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Created(RelationEdge),
    Skipped(SkipReason),
}

/// Allow-list and confidence floor for machine edges.
#[derive(Debug, Clone)]
pub struct AcceptancePolicy {
    pub allowed: Vec<RelationType>,
    pub min_confidence: f64,
}

impl AcceptancePolicy {
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self {
            allowed: config.allowed_relations.clone(),
            min_confidence: config.min_confidence,
        }
    }

    /// Check a verdict against the policy, ignoring existing edges.
    pub fn evaluate(&self, verdict: &Verdict) -> std::result::Result<(RelationType, f64), SkipReason> {
        match verdict {
            Verdict::Related { relation, confidence, .. } => {
                if !self.allowed.contains(relation) {
                    Err(SkipReason::Disallowed)
                } else if *confidence < self.min_confidence {
                    Err(SkipReason::LowConfidence)
                } else {
                    Ok((*relation, *confidence))
                }
            }
            Verdict::Unrelated { .. } => Err(SkipReason::NoRelation),
            Verdict::Unparseable { .. } => Err(SkipReason::Unparseable),
            Verdict::Unavailable { .. } => Err(SkipReason::Unavailable),
        }
    }
}

/// Materialized set of linked sense pairs.
#[derive(Debug, Default)]
pub struct EdgeLedger {
    pairs: HashSet<PairKey>,
}

impl EdgeLedger {
    /// Load the keys of every existing edge, human or machine.
    pub async fn load(db: &Db) -> Result<Self> {
        let pairs = db
            .with_connection(|conn| {
                let mut stmt = conn.prepare("SELECT source_sense_id, target_sense_id FROM sense_relations")?;
                let rows = stmt.query_map([], |row| {
                    Ok(PairKey::new(row.get::<_, SenseId>(0)?, row.get::<_, SenseId>(1)?))
                })?;
                let mut pairs = HashSet::new();
                for row in rows {
                    pairs.insert(row?);
                }
                Ok(pairs)
            })
            .await?;
        log::debug!("Edge ledger loaded: {} linked pairs", pairs.len());
        Ok(Self { pairs })
    }

    pub fn is_linked(&self, a: SenseId, b: SenseId) -> bool {
        self.pairs.contains(&PairKey::new(a, b))
    }

    pub fn record(&mut self, a: SenseId, b: SenseId) {
        self.pairs.insert(PairKey::new(a, b));
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Turn a verdict on `source -> target` into an edge, or say why not.
    ///
    /// Business-rule rejections are `Skipped`, never errors; only database failures
    /// propagate.
    pub async fn apply(
        &mut self,
        db: &Db,
        policy: &AcceptancePolicy,
        source: SenseId,
        target: SenseId,
        verdict: &Verdict,
    ) -> Result<MutationOutcome> {
        if source == target {
            return Ok(MutationOutcome::Skipped(SkipReason::SelfLoop));
        }

        let (relation_type, confidence) = match policy.evaluate(verdict) {
            Ok(accepted) => accepted,
            Err(reason) => return Ok(MutationOutcome::Skipped(reason)),
        };

        if self.is_linked(source, target) {
            return Ok(MutationOutcome::Skipped(SkipReason::Duplicate));
        }

        let edge = RelationEdge {
            relation_id: Uuid::new_v4().to_string(),
            source_sense_id: source,
            target_sense_id: target,
            relation_type,
            strength: strength_from_confidence(confidence),
            rationale: verdict.as_tuple().1.to_string(),
            provenance: Provenance::Machine,
            status: VerificationStatus::Unverified,
        };

        let to_insert = edge.clone();
        let inserted = match db.with_connection(move |conn| insert_edge(conn, &to_insert)).await {
            Ok(inserted) => inserted,
            Err(e) if e.is_foreign_key_violation() => {
                log::warn!("Dropping edge {} -> {}: sense no longer exists", source, target);
                return Ok(MutationOutcome::Skipped(SkipReason::MissingSense));
            }
            Err(e) => return Err(e),
        };
        self.record(source, target);

        if inserted {
            log::info!(
                "New edge: {} -[{} {}]-> {}",
                source,
                edge.relation_type,
                edge.strength,
                target
            );
            Ok(MutationOutcome::Created(edge))
        } else {
            log::debug!("Edge {} already stored by another run", edge.pair_key());
            Ok(MutationOutcome::Skipped(SkipReason::Duplicate))
        }
    }
}

//! Sense relation graph: candidate retrieval, classification, edge insertion,
//! scan checkpoints, and read-only traversal/statistics.

mod classifier;
mod index;
mod mutator;
mod oracle;
mod retriever;
mod scan;
mod stats;
mod store;
mod traversal;

pub use classifier::{build_prompt, parse_verdict, RelationClassifier, Verdict};
pub use index::{cosine_similarity, SenseIndex};
pub use mutator::{AcceptancePolicy, EdgeLedger, MutationOutcome, SkipReason};
pub use oracle::{OpenAIOracle, RelationOracle};
pub use retriever::{retrieve_candidates, Candidate};
pub use scan::{is_scan_eligible, mark_scanned};
pub use stats::{graph_stats, GraphStats};
pub use store::list_edges;
pub use traversal::traverse_graph;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LexigraphError;
use crate::lexicon::SenseId;

/// Closed vocabulary of semantic relations between senses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationType {
    Synonym,
    Antonym,
    Hypernym,
    Hyponym,
    Meronym,
    Holonym,
}

impl RelationType {
    pub const ALL: [RelationType; 6] = [
        RelationType::Synonym,
        RelationType::Antonym,
        RelationType::Hypernym,
        RelationType::Hyponym,
        RelationType::Meronym,
        RelationType::Holonym,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::Synonym => "synonym",
            RelationType::Antonym => "antonym",
            RelationType::Hypernym => "hypernym",
            RelationType::Hyponym => "hyponym",
            RelationType::Meronym => "meronym",
            RelationType::Holonym => "holonym",
        }
    }

    /// One-line definition, phrased for the source → target direction.
    pub fn definition(&self) -> &'static str {
        match self {
            RelationType::Synonym => "A means the same as B",
            RelationType::Antonym => "A means the opposite of B",
            RelationType::Hypernym => "A is a more general term than B (B is a kind of A)",
            RelationType::Hyponym => "A is a more specific term than B (A is a kind of B)",
            RelationType::Meronym => "A is a part or member of B",
            RelationType::Holonym => "A is a whole that has B as a part or member",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationType {
    type Err = LexigraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RelationType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LexigraphError::Parse(format!("Unknown relation type: {}", s)))
    }
}

/// Who created an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Machine,
    Human,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Machine => "machine",
            Provenance::Human => "human",
        }
    }
}

impl FromStr for Provenance {
    type Err = LexigraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "machine" => Ok(Provenance::Machine),
            "human" => Ok(Provenance::Human),
            other => Err(LexigraphError::Parse(format!("Unknown provenance: {}", other))),
        }
    }
}

/// Review state of an edge. The pipeline only ever writes `Unverified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Unverified,
    Flagged,
    Pending,
    Verified,
    Canonical,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Unverified => "unverified",
            VerificationStatus::Flagged => "flagged",
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Canonical => "canonical",
        }
    }
}

impl FromStr for VerificationStatus {
    type Err = LexigraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unverified" => Ok(VerificationStatus::Unverified),
            "flagged" => Ok(VerificationStatus::Flagged),
            "pending" => Ok(VerificationStatus::Pending),
            "verified" => Ok(VerificationStatus::Verified),
            "canonical" => Ok(VerificationStatus::Canonical),
            other => Err(LexigraphError::Parse(format!("Unknown verification status: {}", other))),
        }
    }
}

/// Direction-independent key of a sense pair: `"{min}-{max}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey(String);

impl PairKey {
    pub fn new(a: SenseId, b: SenseId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        PairKey(format!("{}-{}", lo, hi))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A directed, typed link between two senses (source --relation_type--> target).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationEdge {
    /// Unique identifier (UUID v4).
    pub relation_id: String,
    pub source_sense_id: SenseId,
    pub target_sense_id: SenseId,
    pub relation_type: RelationType,
    /// 0-100, from classifier confidence.
    pub strength: u8,
    pub rationale: String,
    pub provenance: Provenance,
    pub status: VerificationStatus,
}

impl RelationEdge {
    pub fn pair_key(&self) -> PairKey {
        PairKey::new(self.source_sense_id, self.target_sense_id)
    }
}

/// Map a classifier confidence in [0, 1] to an edge strength in [0, 100].
pub fn strength_from_confidence(confidence: f64) -> u8 {
    (confidence.clamp(0.0, 1.0) * 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_key_is_direction_independent() {
        assert_eq!(PairKey::new(7, 3), PairKey::new(3, 7));
        assert_eq!(PairKey::new(7, 3).as_str(), "3-7");
        assert_ne!(PairKey::new(1, 23), PairKey::new(12, 3));
    }

    #[test]
    fn test_relation_type_parse() {
        assert_eq!("antonym".parse::<RelationType>().unwrap(), RelationType::Antonym);
        assert_eq!(" Hypernym ".parse::<RelationType>().unwrap(), RelationType::Hypernym);
        assert!("none".parse::<RelationType>().is_err());
        for t in RelationType::ALL {
            assert_eq!(t.as_str().parse::<RelationType>().unwrap(), t);
        }
    }

    #[test]
    fn test_strength_from_confidence() {
        assert_eq!(strength_from_confidence(0.92), 92);
        assert_eq!(strength_from_confidence(0.606), 61);
        assert_eq!(strength_from_confidence(1.4), 100);
        assert_eq!(strength_from_confidence(-0.2), 0);
    }

    #[test]
    fn test_status_and_provenance_parse() {
        assert_eq!("canonical".parse::<VerificationStatus>().unwrap(), VerificationStatus::Canonical);
        assert!("approved".parse::<VerificationStatus>().is_err());
        assert_eq!("human".parse::<Provenance>().unwrap(), Provenance::Human);
        assert!("bot".parse::<Provenance>().is_err());
    }
}

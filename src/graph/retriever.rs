//! Candidate retrieval for one source sense.

use crate::graph::{EdgeLedger, SenseIndex};
use crate::lexicon::{Sense, SenseId};

/// A similarity neighbor of a source sense, pending classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub sense_id: SenseId,
    pub similarity: f32,
}

/// Up to `k` candidates for `source`, most similar first.
///
/// The top `k` other-entry neighbors are taken first, then anything below
/// `min_similarity` or already linked to `source` in either direction is dropped.
/// A source without a fresh vector in the index yields no candidates.
pub fn retrieve_candidates(
    index: &SenseIndex,
    ledger: &EdgeLedger,
    source: &Sense,
    k: usize,
    min_similarity: f32,
) -> Vec<Candidate> {
    let query = match index.vector(source.sense_id) {
        Some(v) => v,
        None => {
            log::debug!("Sense {} has no fresh vector, no candidates", source.sense_id);
            return Vec::new();
        }
    };

    index
        .nearest(query, source.entry_id, source.sense_id, k)
        .into_iter()
        .filter(|(_, similarity)| *similarity >= min_similarity)
        .filter(|(sense_id, _)| !ledger.is_linked(source.sense_id, *sense_id))
        .map(|(sense_id, similarity)| Candidate { sense_id, similarity })
        .collect()
}

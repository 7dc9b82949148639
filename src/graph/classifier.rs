//! Relation classification of a (source, candidate) sense pair.
//!
//! Oracle output is untrusted free text. It is parsed into a `Verdict`, and every
//! way it can go wrong has its own variant instead of an error, so callers always
//! handle the "no relation" path and a noisy answer never stops a run.

use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

use crate::graph::{RelationOracle, RelationType};
use crate::lexicon::Sense;

pub const SYSTEM_PROMPT: &str = "You are a careful lexicographer. You classify the semantic \
relation between two word senses and answer with a single JSON object and nothing else.";

/// Result of classifying one sense pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// The oracle named a relation from the vocabulary.
    Related {
        relation: RelationType,
        rationale: String,
        confidence: f64,
    },
    /// The oracle answered "none".
    Unrelated { rationale: String, confidence: f64 },
    /// The answer could not be read as a verdict.
    Unparseable { reason: String },
    /// The oracle call itself failed or timed out.
    Unavailable { reason: String },
}

impl Verdict {
    /// `(relation, rationale, confidence)`, where anything but `Related` reads as "none".
    /// Unparseable and unavailable verdicts read as `("none", "", 0.0)`.
    pub fn as_tuple(&self) -> (&str, &str, f64) {
        match self {
            Verdict::Related { relation, rationale, confidence } => (relation.as_str(), rationale.as_str(), *confidence),
            Verdict::Unrelated { rationale, confidence } => ("none", rationale.as_str(), *confidence),
            Verdict::Unparseable { .. } | Verdict::Unavailable { .. } => ("none", "", 0.0),
        }
    }
}

#[derive(Deserialize)]
struct RawVerdict {
    relation: Option<String>,
    #[serde(alias = "rationale")]
    explanation: Option<String>,
    confidence: Option<f64>,
}

fn code_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$").expect("Invalid regex pattern")
    })
}

/// Parse an oracle answer.
pub fn parse_verdict(text: &str) -> Verdict {
    let body = match code_fence().captures(text) {
        Some(cap) => cap.get(1).map_or("", |m| m.as_str()),
        None => text.trim(),
    };

    let raw: RawVerdict = match serde_json::from_str(body) {
        Ok(raw) => raw,
        Err(e) => return Verdict::Unparseable { reason: format!("malformed JSON: {}", e) },
    };

    let (relation, rationale, confidence) = match (raw.relation, raw.explanation, raw.confidence) {
        (Some(r), Some(e), Some(c)) => (r, e, c),
        _ => {
            return Verdict::Unparseable {
                reason: "missing relation, explanation or confidence".to_string(),
            }
        }
    };

    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Verdict::Unparseable { reason: format!("confidence out of range: {}", confidence) };
    }

    let rationale = rationale.trim().to_string();
    if relation.trim().eq_ignore_ascii_case("none") {
        return Verdict::Unrelated { rationale, confidence };
    }

    match relation.parse::<RelationType>() {
        Ok(relation) => Verdict::Related { relation, rationale, confidence },
        Err(_) => Verdict::Unparseable { reason: format!("unknown relation: {}", relation) },
    }
}

/// Build the user prompt for one pair.
pub fn build_prompt(source: &Sense, candidate: &Sense, allowed: &[RelationType]) -> String {
    let mut vocabulary = String::new();
    for relation in allowed {
        vocabulary.push_str(&format!("- {}: {}\n", relation.as_str(), relation.definition()));
    }
    vocabulary.push_str("- none: no relation above applies\n");

    format!(
        "Classify the relation from sense A to sense B.\n\n\
         Relation types:\n{vocabulary}\n\
         Sense A: {a_lemma} ({a_pos}): {a_def}\n\
         Sense B: {b_lemma} ({b_pos}): {b_def}\n\n\
         Respond with JSON: {{\"relation\": \"<type or none>\", \
         \"explanation\": \"<one short sentence>\", \"confidence\": <number between 0 and 1>}}",
        vocabulary = vocabulary,
        a_lemma = source.lemma,
        a_pos = source.part_of_speech,
        a_def = source.definition.trim(),
        b_lemma = candidate.lemma,
        b_pos = candidate.part_of_speech,
        b_def = candidate.definition.trim(),
    )
}

/// Classifies sense pairs through a `RelationOracle`, one call per pair.
pub struct RelationClassifier<'a> {
    oracle: &'a dyn RelationOracle,
    allowed: Vec<RelationType>,
    timeout: Duration,
}

impl<'a> RelationClassifier<'a> {
    pub fn new(oracle: &'a dyn RelationOracle, allowed: Vec<RelationType>, timeout: Duration) -> Self {
        Self { oracle, allowed, timeout }
    }

    /// Classify one pair. Never fails: transport problems become `Unavailable`,
    /// unreadable answers become `Unparseable`.
    pub async fn classify(&self, source: &Sense, candidate: &Sense) -> Verdict {
        let prompt = build_prompt(source, candidate, &self.allowed);
        let answer = match tokio::time::timeout(self.timeout, self.oracle.complete(SYSTEM_PROMPT, &prompt)).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => return Verdict::Unavailable { reason: e.to_string() },
            Err(_) => {
                return Verdict::Unavailable {
                    reason: format!("oracle timed out after {:?}", self.timeout),
                }
            }
        };

        let verdict = parse_verdict(&answer);
        if let Verdict::Unparseable { reason } = &verdict {
            log::warn!(
                "Unparseable verdict for senses {} -> {}: {}",
                source.sense_id,
                candidate.sense_id,
                reason
            );
        }
        verdict
    }
}

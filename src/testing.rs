//! Shared fixtures for unit tests: throwaway databases, lexicon seeding, and
//! scripted stand-ins for the embedding service and the classification oracle.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;
use uuid::Uuid;

use crate::config::{Config, EmbeddingsConfig};
use crate::db::{migrate, Db};
use crate::embeddings::EmbeddingService;
use crate::error::{LexigraphError, Result};
use crate::graph::{PairKey, RelationOracle, RelationType};
use crate::lexicon::{format_timestamp, EntryId, SenseId};

pub(crate) const TEST_MODEL: &str = "test-embedding";

const TEST_CONFIG: &str = r#"
[lexigraph]
db_path = "./unused.db"

[embeddings]
provider = "openai"
model = "test-embedding"
api_key_env = "LEXIGRAPH_TEST_EMBED_KEY"
batch_size = 2
dimensions = 3
max_concurrency = 2
timeout_secs = 5

[discovery]
model = "test-oracle"
api_key_env = "LEXIGRAPH_TEST_ORACLE_KEY"
top_k = 5
min_similarity = 0.7
min_confidence = 0.6
request_delay_ms = 0
timeout_secs = 5
"#;

pub(crate) fn test_config() -> Config {
    Config::from_toml(TEST_CONFIG).unwrap()
}

pub(crate) fn embeddings_config() -> EmbeddingsConfig {
    test_config().embeddings
}

pub(crate) async fn setup_test_db() -> (Db, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Db::new(temp_dir.path().join("test.db"));
    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
    db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
        .await
        .unwrap();
    (db, temp_dir)
}

pub(crate) async fn insert_entry(db: &Db, entry_id: EntryId, lemma: &str, pos: &str) -> EntryId {
    let lemma = lemma.to_string();
    let pos = pos.to_string();
    db.with_connection(move |conn| {
        conn.execute(
            "INSERT INTO entries (entry_id, lemma, part_of_speech) VALUES (?1, ?2, ?3)",
            params![entry_id, lemma, pos],
        )?;
        Ok(())
    })
    .await
    .unwrap();
    entry_id
}

pub(crate) async fn insert_sense(db: &Db, sense_id: SenseId, entry_id: EntryId, definition: &str) -> SenseId {
    let definition = definition.to_string();
    db.with_connection(move |conn| {
        conn.execute(
            "INSERT INTO senses (sense_id, entry_id, definition, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![sense_id, entry_id, definition, format_timestamp(Utc::now())],
        )?;
        Ok(())
    })
    .await
    .unwrap();
    sense_id
}

/// Edit a sense the way the authoring surface would.
pub(crate) async fn touch_sense(db: &Db, sense_id: SenseId, definition: &str) {
    let definition = definition.to_string();
    db.with_connection(move |conn| {
        conn.execute(
            "UPDATE senses SET definition = ?1, updated_at = ?2 WHERE sense_id = ?3",
            params![definition, format_timestamp(Utc::now()), sense_id],
        )?;
        Ok(())
    })
    .await
    .unwrap();
}

/// Remove a sense the way the authoring surface would; embeddings and edges cascade.
pub(crate) async fn delete_sense(db: &Db, sense_id: SenseId) {
    db.with_connection(move |conn| {
        conn.execute("DELETE FROM senses WHERE sense_id = ?1", params![sense_id])?;
        Ok(())
    })
    .await
    .unwrap();
}

pub(crate) async fn insert_human_edge(db: &Db, source: SenseId, target: SenseId, relation: RelationType) {
    db.with_connection(move |conn| {
        conn.execute(
            "INSERT INTO sense_relations (
                relation_id, source_sense_id, target_sense_id, relation_type,
                strength, rationale, provenance, status, pair_key
            ) VALUES (?1, ?2, ?3, ?4, 100, 'editor', 'human', 'verified', ?5)",
            params![
                Uuid::new_v4().to_string(),
                source,
                target,
                relation.as_str(),
                PairKey::new(source, target).as_str(),
            ],
        )?;
        Ok(())
    })
    .await
    .unwrap();
}

/// Embedding service returning scripted vectors.
///
/// A text gets the vector of the first registered needle it contains, or a
/// deterministic fallback. Batches containing the malformed needle come back one
/// vector short; batches containing the failing needle return an error.
pub(crate) struct FakeEmbedder {
    pub calls: AtomicUsize,
    vectors: Vec<(String, Vec<f32>)>,
    malformed: Option<String>,
    failing: Option<String>,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            vectors: Vec::new(),
            malformed: None,
            failing: None,
        }
    }

    pub fn vector(mut self, needle: &str, vector: Vec<f32>) -> Self {
        self.vectors.push((needle.to_string(), vector));
        self
    }

    pub fn malformed_when_contains(mut self, needle: &str) -> Self {
        self.malformed = Some(needle.to_string());
        self
    }

    pub fn failing_when_contains(mut self, needle: &str) -> Self {
        self.failing = Some(needle.to_string());
        self
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        self.vectors
            .iter()
            .find(|(needle, _)| text.contains(needle.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| {
                let h = text.bytes().map(|b| b as u32).sum::<u32>();
                vec![(h % 7) as f32 + 1.0, (h % 11) as f32, (h % 13) as f32]
            })
    }
}

#[async_trait]
impl EmbeddingService for FakeEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let contains = |needle: &Option<String>| {
            needle
                .as_ref()
                .map_or(false, |n| texts.iter().any(|t| t.contains(n.as_str())))
        };
        if contains(&self.failing) {
            return Err(LexigraphError::Embedding("scripted failure".to_string()));
        }
        let mut vectors: Vec<Vec<f32>> = texts.iter().map(|t| self.vector_for(t)).collect();
        if contains(&self.malformed) {
            vectors.pop();
        }
        Ok(vectors)
    }
}

/// Oracle answering from scripted rules keyed on two prompt substrings.
///
/// Prompts matching no rule get a "none" answer with zero confidence.
pub(crate) struct FakeOracle {
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
    rules: Vec<(String, String, String)>,
    unavailable: Option<String>,
}

impl FakeOracle {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            rules: Vec::new(),
            unavailable: None,
        }
    }

    pub fn answer(mut self, a: &str, b: &str, response: &str) -> Self {
        self.rules.push((a.to_string(), b.to_string(), response.to_string()));
        self
    }

    pub fn unavailable_when_contains(mut self, needle: &str) -> Self {
        self.unavailable = Some(needle.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelationOracle for FakeOracle {
    async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(user_prompt.to_string());
        if let Some(needle) = &self.unavailable {
            if user_prompt.contains(needle.as_str()) {
                return Err(LexigraphError::Oracle("scripted outage".to_string()));
            }
        }
        let answer = self
            .rules
            .iter()
            .find(|(a, b, _)| user_prompt.contains(a.as_str()) && user_prompt.contains(b.as_str()))
            .map(|(_, _, response)| response.clone())
            .unwrap_or_else(|| r#"{"relation": "none", "explanation": "", "confidence": 0.0}"#.to_string());
        Ok(answer)
    }
}

pub mod openai;
pub mod refresher;
pub mod storage;

use async_trait::async_trait;

use crate::error::Result;

pub use openai::OpenAIEmbedder;
pub use refresher::{refresh_embeddings, RefreshReport};
pub use storage::{decode_embedding, encode_embedding, upsert_embeddings_batch};

/// A service that turns a batch of texts into one vector per text, in input order.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
}

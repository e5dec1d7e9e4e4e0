use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::Result;
use crate::types::{Generation, GenerationRequest, Partition, SearchHit, VectorRecord};

/// Turns text into fixed-dimension vectors, one per input, order-preserving.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the model (e.g. `local:all-MiniLM-L6-v2:d384`).
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Persistent key-similarity store organised in named collections.
///
/// Writes are additive: `add` never overwrites an existing record.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add(&self, collection: &str, records: &[VectorRecord]) -> Result<usize>;

    /// Most similar chunks first, restricted to `partitions`. An empty
    /// `partitions` slice yields no hits.
    async fn similarity_search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        partitions: &[Partition],
    ) -> Result<Vec<SearchHit>>;

    /// Number of records in `collection`; zero if it does not exist.
    async fn count(&self, collection: &str) -> Result<usize>;

    /// Records in `collection` whose partition is one of `partitions`.
    async fn count_in(&self, collection: &str, partitions: &[Partition]) -> Result<usize>;

    async fn content_hashes(&self, collection: &str) -> Result<HashSet<String>>;
}

/// Produces an answer plus attribution text from a question and context.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation>;
}

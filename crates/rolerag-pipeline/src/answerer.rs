use std::sync::Arc;
use tracing::{debug, info, warn};

use rolerag_core::traits::{Embedder, Generator, VectorStore};
use rolerag_core::types::{Answer, ContextPassage, GenerationRequest, Partition};
use rolerag_core::{Error, Result};

use crate::context::embed_blocking;

/// Retrieves the top-k permitted passages for a question and asks the
/// generator for a grounded answer.
pub struct Answerer {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn Generator>,
    top_k: usize,
    temperature: f32,
    max_tokens: u32,
}

impl Answerer {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, generator: Arc<dyn Generator>) -> Self {
        Self { embedder, store, generator, top_k: 4, temperature: 0.2, max_tokens: 2000 }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Only chunks from `partitions` can reach the generator, whatever the
    /// collection holds.
    pub async fn answer(&self, collection: &str, partitions: &[Partition], question: &str) -> Result<Answer> {
        let context = self.retrieve(collection, partitions, question).await?;
        debug!(passages = context.len(), "context retrieved");

        let request = GenerationRequest {
            question: question.to_string(),
            context,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let generation = self.generator.generate(&request).await?;
        let (sources, unverified_sources) = verify_sources(&generation.attribution, &request.context);
        if !unverified_sources.is_empty() {
            warn!(?unverified_sources, "generator cited sources that were not in the context");
        }
        info!(sources = sources.len(), "answer generated");

        Ok(Answer {
            text: generation.answer,
            sources,
            unverified_sources,
            raw_sources: generation.attribution,
            context: request.context,
        })
    }

    pub async fn retrieve(&self, collection: &str, partitions: &[Partition], question: &str) -> Result<Vec<ContextPassage>> {
        let mut vectors = embed_blocking(&self.embedder, vec![question.to_string()]).await?;
        let query = vectors.pop().ok_or_else(|| Error::Embedding("no vector for query".into()))?;
        let hits = self.store.similarity_search(collection, &query, self.top_k, partitions).await?;
        Ok(hits
            .into_iter()
            .filter(|h| partitions.contains(&h.chunk.partition))
            .map(|h| ContextPassage { content: h.chunk.content, source: h.chunk.source })
            .collect())
    }
}

/// Split the model's attribution into sources that match a supplied passage
/// and sources that do not.
///
/// Items are separated by commas, semicolons or newlines. A bare file name
/// matches a passage labelled `partition/file name` and is reported under the
/// full label. Order of first mention is kept and duplicates are dropped.
pub fn verify_sources(attribution: &str, context: &[ContextPassage]) -> (Vec<String>, Vec<String>) {
    let mut verified: Vec<String> = Vec::new();
    let mut unverified: Vec<String> = Vec::new();
    for item in attribution.split([',', ';', '\n']) {
        let item = item.trim().trim_start_matches(['-', '*']).trim();
        if item.is_empty() {
            continue;
        }
        let matched = context.iter().map(|p| p.source.as_str()).find(|source| {
            *source == item || source.rsplit_once('/').is_some_and(|(_, name)| name == item)
        });
        match matched {
            Some(source) if !verified.iter().any(|v| v == source) => verified.push(source.to_string()),
            Some(_) => {}
            None if !unverified.iter().any(|u| u == item) => unverified.push(item.to_string()),
            None => {}
        }
    }
    (verified, unverified)
}

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing::{debug, info};

use rolerag_core::config::DedupPolicy;
use rolerag_core::traits::{Embedder, VectorStore};
use rolerag_core::types::{DocumentChunk, VectorRecord};
use rolerag_core::{Error, Result};

use crate::context::embed_blocking;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub written: usize,
    pub skipped: usize,
}

/// Embeds chunks and appends them to a collection.
pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    batch_size: usize,
    dedup: DedupPolicy,
}

impl Indexer {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store, batch_size: 64, dedup: DedupPolicy::Append }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_dedup(mut self, dedup: DedupPolicy) -> Self {
        self.dedup = dedup;
        self
    }

    /// Empty input is a no-op: no embedding calls and no store writes.
    pub async fn index(&self, collection: &str, chunks: &[DocumentChunk]) -> Result<IndexReport> {
        if chunks.is_empty() {
            debug!(collection, "no chunks to index");
            return Ok(IndexReport::default());
        }

        let pending: Vec<&DocumentChunk> = match self.dedup {
            DedupPolicy::Append => chunks.iter().collect(),
            DedupPolicy::ContentHash => {
                let mut seen = self.store.content_hashes(collection).await?;
                chunks.iter().filter(|c| seen.insert(c.content_hash.clone())).collect()
            }
        };
        let mut report = IndexReport { written: 0, skipped: chunks.len() - pending.len() };
        if pending.is_empty() {
            info!(collection, skipped = report.skipped, "all chunks already indexed");
            return Ok(report);
        }

        info!(collection, chunks = pending.len(), "indexing chunks");
        let pb = ProgressBar::new(pending.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%)")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = embed_blocking(&self.embedder, texts).await?;
            if vectors.len() != batch.len() {
                return Err(Error::Embedding(format!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }
            let dim = self.embedder.dim();
            if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
                return Err(Error::Embedding(format!("dim mismatch: got {} expected {dim}", bad.len())));
            }
            let records: Vec<VectorRecord> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| VectorRecord { chunk: (*chunk).clone(), vector })
                .collect();
            report.written += self.store.add(collection, &records).await?;
            pb.inc(batch.len() as u64);
        }
        pb.finish_and_clear();
        info!(collection, written = report.written, skipped = report.skipped, "indexing complete");
        Ok(report)
    }
}

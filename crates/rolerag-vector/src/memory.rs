//! In-process vector store with brute-force cosine search.
//!
//! Backs tests and `--dry-run` style runs; nothing is persisted.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use rolerag_core::traits::VectorStore;
use rolerag_core::types::{Partition, SearchHit, VectorRecord};
use rolerag_core::{Error, Result};

#[derive(Default)]
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, Vec<VectorRecord>>>,
    writes: AtomicUsize,
}

impl MemoryVectorStore {
    pub fn new() -> Self { Self::default() }

    /// Number of `add` calls that wrote at least one record.
    pub fn write_calls(&self) -> usize { self.writes.load(Ordering::SeqCst) }

    pub fn records(&self, collection: &str) -> Vec<VectorRecord> {
        self.collections
            .read()
            .map(|c| c.get(collection).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().map(|c| c.keys().cloned().collect()).unwrap_or_default();
        names.sort();
        names
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

fn poisoned() -> Error { Error::Store("memory store lock poisoned".into()) }

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn add(&self, collection: &str, records: &[VectorRecord]) -> Result<usize> {
        if records.is_empty() { return Ok(0); }
        let mut guard = self.collections.write().map_err(|_| poisoned())?;
        let rows = guard.entry(collection.to_string()).or_default();
        if let Some(dim) = rows.first().map(|r| r.vector.len()) {
            if let Some(bad) = records.iter().find(|r| r.vector.len() != dim) {
                return Err(Error::Store(format!("dim mismatch: got {} expected {dim}", bad.vector.len())));
            }
        }
        rows.extend(records.iter().cloned());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(records.len())
    }

    async fn similarity_search(&self, collection: &str, query: &[f32], k: usize, partitions: &[Partition]) -> Result<Vec<SearchHit>> {
        let guard = self.collections.read().map_err(|_| poisoned())?;
        let Some(rows) = guard.get(collection) else { return Ok(Vec::new()) };
        let mut hits: Vec<SearchHit> = rows
            .iter()
            .filter(|r| partitions.contains(&r.chunk.partition))
            .map(|r| SearchHit { chunk: r.chunk.clone(), score: cosine(query, &r.vector) })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let guard = self.collections.read().map_err(|_| poisoned())?;
        Ok(guard.get(collection).map_or(0, Vec::len))
    }

    async fn count_in(&self, collection: &str, partitions: &[Partition]) -> Result<usize> {
        let guard = self.collections.read().map_err(|_| poisoned())?;
        Ok(guard
            .get(collection)
            .map_or(0, |rows| rows.iter().filter(|r| partitions.contains(&r.chunk.partition)).count()))
    }

    async fn content_hashes(&self, collection: &str) -> Result<HashSet<String>> {
        let guard = self.collections.read().map_err(|_| poisoned())?;
        Ok(guard
            .get(collection)
            .map(|rows| rows.iter().map(|r| r.chunk.content_hash.clone()).collect())
            .unwrap_or_default())
    }
}

use anyhow::{anyhow, Result};
use arrow_array::{FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use rolerag_core::traits::VectorStore;
use rolerag_core::types::{DocumentChunk, Partition, SearchHit, VectorRecord};
use rolerag_core::Error;

use crate::schema::build_chunk_schema;
use crate::table::{int_col, open_db, partition_filter, score_at, string_col, table_exists};

/// On-disk vector store. Each collection is a LanceDB table; the directory
/// persists across restarts.
pub struct LanceVectorStore {
    db: Connection,
    dim: i32,
}

impl LanceVectorStore {
    pub async fn open(db_path: &Path, dim: usize) -> rolerag_core::Result<Self> {
        let dim = i32::try_from(dim).map_err(|_| Error::init("vector store", format!("dimension {dim} too large")))?;
        std::fs::create_dir_all(db_path).map_err(|e| Error::init("vector store", e))?;
        let db = open_db(db_path.to_string_lossy().as_ref())
            .await
            .map_err(|e| Error::init("vector store", e))?;
        info!(path = %db_path.display(), dim, "vector store opened");
        Ok(Self { db, dim })
    }

    fn records_to_batch(&self, records: &[VectorRecord]) -> Result<RecordBatch> {
        let schema = build_chunk_schema(self.dim);
        let now = Utc::now().timestamp_millis();
        let (mut ids, mut doc_ids, mut doc_paths, mut partitions, mut sources) = (Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new());
        let (mut contents, mut hashes, mut chunk_indices, mut totals, mut times) = (Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new());
        let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(records.len());
        for r in records {
            if r.vector.len() != self.dim as usize {
                return Err(anyhow!("dim mismatch for chunk {}: got {} expected {}", r.chunk.id, r.vector.len(), self.dim));
            }
            let c = &r.chunk;
            ids.push(c.id.clone());
            doc_ids.push(c.doc_id.clone());
            doc_paths.push(c.doc_path.clone());
            partitions.push(c.partition.as_str().to_string());
            sources.push(c.source.clone());
            contents.push(c.content.clone());
            hashes.push(c.content_hash.clone());
            chunk_indices.push(i32::try_from(c.chunk_index)?);
            totals.push(i32::try_from(c.total_chunks)?);
            times.push(now);
            vectors.push(Some(r.vector.iter().map(|&x| Some(x)).collect()));
        }
        let batch = RecordBatch::try_new(schema, vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(doc_ids)),
            Arc::new(StringArray::from(doc_paths)),
            Arc::new(StringArray::from(partitions)),
            Arc::new(StringArray::from(sources)),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(hashes)),
            Arc::new(Int32Array::from(chunk_indices)),
            Arc::new(Int32Array::from(totals)),
            Arc::new(TimestampMillisecondArray::from(times)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), self.dim)),
        ])?;
        Ok(batch)
    }

    async fn insert(&self, collection: &str, records: &[VectorRecord]) -> Result<usize> {
        if records.is_empty() { return Ok(0); }
        let batch = self.records_to_batch(records)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        if table_exists(&self.db, collection).await? {
            self.db.open_table(collection).execute().await?.add(reader).execute().await?;
        } else {
            self.db.create_table(collection, reader).execute().await?;
        }
        debug!(collection, rows = records.len(), "appended records");
        Ok(records.len())
    }

    async fn search(&self, collection: &str, query: &[f32], k: usize, partitions: &[Partition]) -> Result<Vec<SearchHit>> {
        if partitions.is_empty() || k == 0 || !table_exists(&self.db, collection).await? {
            return Ok(Vec::new());
        }
        let table = self.db.open_table(collection).execute().await?;
        let filter = partition_filter(partitions.iter().map(Partition::as_str));
        let mut stream = table
            .vector_search(query.to_vec())?
            .distance_type(DistanceType::Cosine)
            .only_if(filter)
            .limit(k)
            .execute()
            .await?;
        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            let ids = string_col(&batch, "id")?;
            let doc_ids = string_col(&batch, "doc_id")?;
            let doc_paths = string_col(&batch, "doc_path")?;
            let parts = string_col(&batch, "partition")?;
            let sources = string_col(&batch, "source")?;
            let contents = string_col(&batch, "content")?;
            let hashes = string_col(&batch, "content_hash")?;
            let chunk_indices = int_col(&batch, "chunk_index")?;
            let totals = int_col(&batch, "total_chunks")?;
            for i in 0..batch.num_rows() {
                let chunk = DocumentChunk {
                    id: ids.value(i).to_string(),
                    doc_id: doc_ids.value(i).to_string(),
                    doc_path: doc_paths.value(i).to_string(),
                    partition: Partition::new(parts.value(i)),
                    source: sources.value(i).to_string(),
                    content: contents.value(i).to_string(),
                    content_hash: hashes.value(i).to_string(),
                    chunk_index: usize::try_from(chunk_indices.value(i))?,
                    total_chunks: usize::try_from(totals.value(i))?,
                };
                hits.push(SearchHit { chunk, score: score_at(&batch, i) });
            }
        }
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn count_rows(&self, collection: &str) -> Result<usize> {
        if !table_exists(&self.db, collection).await? { return Ok(0); }
        Ok(self.db.open_table(collection).execute().await?.count_rows(None).await?)
    }

    async fn count_partitions(&self, collection: &str, partitions: &[Partition]) -> Result<usize> {
        if partitions.is_empty() || !table_exists(&self.db, collection).await? { return Ok(0); }
        let filter = partition_filter(partitions.iter().map(Partition::as_str));
        Ok(self.db.open_table(collection).execute().await?.count_rows(Some(filter)).await?)
    }

    async fn hashes(&self, collection: &str) -> Result<HashSet<String>> {
        let mut out = HashSet::new();
        if !table_exists(&self.db, collection).await? { return Ok(out); }
        let table = self.db.open_table(collection).execute().await?;
        let mut stream = table.query().select(Select::columns(&["content_hash"])).execute().await?;
        while let Some(batch) = stream.try_next().await? {
            let col = string_col(&batch, "content_hash")?;
            for i in 0..batch.num_rows() { out.insert(col.value(i).to_string()); }
        }
        Ok(out)
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn add(&self, collection: &str, records: &[VectorRecord]) -> rolerag_core::Result<usize> {
        self.insert(collection, records).await.map_err(Error::store)
    }

    async fn similarity_search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        partitions: &[Partition],
    ) -> rolerag_core::Result<Vec<SearchHit>> {
        self.search(collection, query, k, partitions).await.map_err(Error::store)
    }

    async fn count(&self, collection: &str) -> rolerag_core::Result<usize> {
        self.count_rows(collection).await.map_err(Error::store)
    }

    async fn count_in(&self, collection: &str, partitions: &[Partition]) -> rolerag_core::Result<usize> {
        self.count_partitions(collection, partitions).await.map_err(Error::store)
    }

    async fn content_hashes(&self, collection: &str) -> rolerag_core::Result<HashSet<String>> {
        self.hashes(collection).await.map_err(Error::store)
    }
}

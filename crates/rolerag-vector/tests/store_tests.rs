use tempfile::TempDir;

use rolerag_core::traits::{Embedder, VectorStore};
use rolerag_core::types::{Document, DocumentKind, Partition, VectorRecord};
use rolerag_core::{Chunker, ChunkingConfig};
use rolerag_embed::FakeEmbedder;
use rolerag_vector::{LanceVectorStore, MemoryVectorStore};

fn records(embedder: &FakeEmbedder) -> Vec<VectorRecord> {
    let docs = [
        ("finance", "budget", "The marketing budget for Q4 is two million dollars."),
        ("marketing", "campaigns", "Spring campaign targets new customers in Europe."),
        ("hr", "leave", "Employees receive twenty days of paid leave per year."),
    ];
    let chunker = Chunker::new(ChunkingConfig::default()).unwrap();
    let chunks: Vec<_> = docs
        .iter()
        .flat_map(|(p, id, text)| {
            chunker.split_document(&Document {
                doc_id: (*id).to_string(),
                path: format!("/data/{p}/{id}.md").into(),
                partition: Partition::new(*p),
                kind: DocumentKind::Markdown,
                content: (*text).to_string(),
            })
        })
        .collect();
    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let vectors = embedder.embed_batch(&texts).unwrap();
    chunks.into_iter().zip(vectors).map(|(chunk, vector)| VectorRecord { chunk, vector }).collect()
}

fn query(embedder: &FakeEmbedder, q: &str) -> Vec<f32> {
    embedder.embed_batch(&[q.to_string()]).unwrap().remove(0)
}

async fn exercise(store: &dyn VectorStore, embedder: &FakeEmbedder) {
    let collection = "Role_Based";
    assert_eq!(store.count(collection).await.unwrap(), 0);
    assert!(store.similarity_search(collection, &query(embedder, "budget"), 4, &[Partition::new("finance")]).await.unwrap().is_empty());

    assert_eq!(store.add(collection, &[]).await.unwrap(), 0);
    assert_eq!(store.count(collection).await.unwrap(), 0);

    let recs = records(embedder);
    assert_eq!(store.add(collection, &recs).await.unwrap(), 3);
    assert_eq!(store.count(collection).await.unwrap(), 3);
    assert_eq!(store.count_in(collection, &[Partition::new("hr")]).await.unwrap(), 1);
    assert_eq!(store.count_in(collection, &[Partition::new("finance"), Partition::new("marketing")]).await.unwrap(), 2);
    assert_eq!(store.count_in(collection, &[Partition::new("engineering")]).await.unwrap(), 0);
    assert_eq!(store.count_in(collection, &[]).await.unwrap(), 0);
    assert_eq!(store.count_in("missing", &[Partition::new("hr")]).await.unwrap(), 0);

    let all = [Partition::new("finance"), Partition::new("marketing"), Partition::new("hr")];
    let hits = store.similarity_search(collection, &query(embedder, "marketing budget Q4"), 2, &all).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk.doc_id, "budget");
    assert!(hits[0].score >= hits[1].score);

    let hits = store.similarity_search(collection, &query(embedder, "marketing budget Q4"), 4, &[Partition::new("hr")]).await.unwrap();
    assert!(hits.iter().all(|h| h.chunk.partition.as_str() == "hr"));
    assert_eq!(hits.len(), 1);

    assert!(store.similarity_search(collection, &query(embedder, "budget"), 4, &[]).await.unwrap().is_empty());

    // re-adding appends, never overwrites
    store.add(collection, &recs).await.unwrap();
    assert_eq!(store.count(collection).await.unwrap(), 6);
    assert_eq!(store.content_hashes(collection).await.unwrap().len(), 3);
}

#[tokio::test]
async fn memory_store_contract() {
    let embedder = FakeEmbedder::default();
    let store = MemoryVectorStore::new();
    exercise(&store, &embedder).await;
    assert_eq!(store.write_calls(), 2);
}

#[tokio::test]
async fn lance_store_contract() {
    let embedder = FakeEmbedder::default();
    let tmp = TempDir::new().expect("tmp");
    let store = LanceVectorStore::open(tmp.path(), embedder.dim()).await.expect("open");
    exercise(&store, &embedder).await;
}

#[tokio::test]
async fn lance_store_persists_across_reopen() {
    let embedder = FakeEmbedder::default();
    let tmp = TempDir::new().expect("tmp");
    {
        let store = LanceVectorStore::open(tmp.path(), embedder.dim()).await.unwrap();
        store.add("Role_Based__hr", &records(&embedder)).await.unwrap();
    }
    let reopened = LanceVectorStore::open(tmp.path(), embedder.dim()).await.unwrap();
    assert_eq!(reopened.count("Role_Based__hr").await.unwrap(), 3);
    assert_eq!(reopened.count("Role_Based__finance").await.unwrap(), 0);
}

#[tokio::test]
async fn lance_store_rejects_wrong_dimension() {
    let embedder = FakeEmbedder::default();
    let tmp = TempDir::new().expect("tmp");
    let store = LanceVectorStore::open(tmp.path(), 8).await.unwrap();
    let err = store.add("c", &records(&embedder)).await.unwrap_err();
    assert!(matches!(err, rolerag_core::Error::Store(_)));
}

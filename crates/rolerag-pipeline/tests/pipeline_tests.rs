use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use rolerag_core::config::{DedupPolicy, IndexScope, Settings};
use rolerag_core::traits::{Embedder, Generator, VectorStore};
use rolerag_core::types::{Document, DocumentKind, Generation, GenerationRequest, Partition};
use rolerag_core::{AccessPolicy, Chunker, ChunkingConfig, DocumentLoader, Error, Result};
use rolerag_embed::FakeEmbedder;
use rolerag_pipeline::{Answerer, ContextCell, Indexer, LoadOutcome, PipelineState, RagContext, Session};
use rolerag_vector::MemoryVectorStore;

enum Script {
    /// Cite every passage it was given.
    EchoSources,
    Cite(&'static str),
    Fail,
}

struct ScriptedGenerator {
    script: Script,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self { script, requests: Mutex::new(Vec::new()) })
    }

    fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        self.requests.lock().unwrap().push(request.clone());
        let attribution = match self.script {
            Script::EchoSources => {
                request.context.iter().map(|p| p.source.as_str()).collect::<Vec<_>>().join(", ")
            }
            Script::Cite(s) => s.to_string(),
            Script::Fail => {
                return Err(Error::Generation { message: "upstream returned 503".into(), retryable: true })
            }
        };
        Ok(Generation { answer: "scripted answer".into(), attribution })
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn seeded_store() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "finance/q4_budget.md", "# Budget\n\nThe marketing budget for Q4 is two million dollars.");
    write(root, "marketing/campaigns.md", "# Campaigns\n\nSpring campaign targets new customers.");
    write(root, "hr/hr_data.csv", "name,department,leave_days\nalice,engineering,20\nbob,finance,18\n");
    write(root, "hr/leave_policy.md", "Employees receive twenty days of paid leave per year.");
    write(root, "general/handbook.md", "The employee handbook covers office hours and leave.");
    tmp
}

struct Harness {
    store: Arc<MemoryVectorStore>,
    generator: Arc<ScriptedGenerator>,
    session: Session,
}

fn harness(docs: &Path, script: Script, settings: Settings) -> Harness {
    let store = Arc::new(MemoryVectorStore::new());
    let generator = ScriptedGenerator::new(script);
    let ctx = RagContext::new(Arc::new(FakeEmbedder::default()), store.clone(), generator.clone(), settings);
    let session = Session::new(ctx, AccessPolicy::standard(), DocumentLoader::new(docs)).unwrap();
    Harness { store, generator, session }
}

#[tokio::test]
async fn hr_answers_only_use_hr_documents() {
    let docs = seeded_store();
    let mut h = harness(docs.path(), Script::EchoSources, Settings::default());

    h.session.select_role("hr").unwrap();
    let outcome = h.session.load_and_index().await.unwrap();
    match outcome {
        LoadOutcome::Indexed { documents, report, .. } => {
            assert_eq!(documents, 2);
            assert!(report.written > 0);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(h.session.state(), PipelineState::IndexPopulated);

    let answer = h.session.ask("How many leave days do employees get?").await.unwrap();
    assert!(!answer.context.is_empty());
    assert!(answer.context.iter().all(|p| p.source.starts_with("hr/")));
    assert!(!answer.sources.is_empty());
    assert!(answer.sources.iter().all(|s| s.starts_with("hr/")));
    assert!(answer.unverified_sources.is_empty());

    let sent = h.generator.requests();
    assert_eq!(sent.len(), 1);
    assert!((sent[0].temperature - 0.2).abs() < f32::EPSILON);
    assert_eq!(sent[0].max_tokens, 2000);
    assert!(sent[0].context.len() <= 4);
}

#[tokio::test]
async fn unknown_role_is_refused_without_touching_the_index() {
    let docs = seeded_store();
    let mut h = harness(docs.path(), Script::EchoSources, Settings::default());

    let err = h.session.select_role("unknown_role").unwrap_err();
    assert!(matches!(err, Error::AuthorizationEmpty { ref role } if role == "unknown_role"));
    assert!(h.session.role().is_none());
    assert_eq!(h.session.state(), PipelineState::ComponentsReady);
    assert!(matches!(h.session.load_and_index().await, Err(Error::QueryPrecondition)));
    assert_eq!(h.store.write_calls(), 0);
}

#[tokio::test]
async fn authorized_role_without_documents_reports_no_documents() {
    let docs = seeded_store();
    let mut h = harness(docs.path(), Script::EchoSources, Settings::default());

    h.session.select_role("engineering").unwrap();
    let outcome = h.session.load_and_index().await.unwrap();
    assert!(matches!(outcome, LoadOutcome::NoDocuments { .. }));
    assert_eq!(h.session.state(), PipelineState::ComponentsReady);
    assert_eq!(h.store.write_calls(), 0);
}

#[tokio::test]
async fn asking_before_indexing_is_a_precondition_error() {
    let docs = seeded_store();
    let mut h = harness(docs.path(), Script::EchoSources, Settings::default());

    assert!(matches!(h.session.ask("anything?").await, Err(Error::QueryPrecondition)));
    h.session.select_role("finance").unwrap();
    assert!(matches!(h.session.ask("What is the budget?").await, Err(Error::QueryPrecondition)));
    assert!(h.generator.requests().is_empty());
}

#[tokio::test]
async fn each_role_gets_its_own_collection() {
    let docs = seeded_store();
    let mut h = harness(docs.path(), Script::EchoSources, Settings::default());

    h.session.select_role("hr").unwrap();
    h.session.load_and_index().await.unwrap();
    h.session.change_role();
    h.session.select_role("marketing").unwrap();
    h.session.load_and_index().await.unwrap();

    let mut names = h.store.collection_names();
    names.sort();
    assert_eq!(names, vec!["Role_Based__hr", "Role_Based__marketing"]);
    assert!(h
        .store
        .records("Role_Based__marketing")
        .iter()
        .all(|r| r.chunk.partition.as_str() == "marketing"));
}

#[tokio::test]
async fn shared_collection_is_still_filtered_by_role() {
    let docs = seeded_store();
    let mut settings = Settings::default();
    settings.index.scope = IndexScope::Shared;
    let mut h = harness(docs.path(), Script::EchoSources, settings);

    h.session.select_role("executive").unwrap();
    h.session.load_and_index().await.unwrap();
    h.session.change_role();
    h.session.select_role("marketing").unwrap();

    // The executive run already populated the shared collection.
    let answer = h.session.ask("What is the Q4 marketing budget?").await.unwrap();
    assert!(!answer.context.is_empty());
    assert!(answer.context.iter().all(|p| p.source.starts_with("marketing/")));
    assert_eq!(h.store.collection_names(), vec!["Role_Based"]);
}

#[tokio::test]
async fn shared_collection_needs_ingest_for_each_role() {
    let docs = seeded_store();
    let mut settings = Settings::default();
    settings.index.scope = IndexScope::Shared;
    let mut h = harness(docs.path(), Script::EchoSources, settings);

    h.session.select_role("finance").unwrap();
    h.session.load_and_index().await.unwrap();
    assert!(h.store.count("Role_Based").await.unwrap() > 0);

    h.session.change_role();
    h.session.select_role("hr").unwrap();
    assert!(matches!(h.session.ask("How many leave days?").await, Err(Error::QueryPrecondition)));
    assert_eq!(h.session.state(), PipelineState::ComponentsReady);
    assert!(h.generator.requests().is_empty());

    h.session.load_and_index().await.unwrap();
    let answer = h.session.ask("How many leave days?").await.unwrap();
    assert!(!answer.context.is_empty());
    assert!(answer.context.iter().all(|p| p.source.starts_with("hr/")));
}

#[tokio::test]
async fn change_role_keeps_index_but_clears_session() {
    let docs = seeded_store();
    let mut h = harness(docs.path(), Script::EchoSources, Settings::default());

    h.session.select_role("hr").unwrap();
    h.session.load_and_index().await.unwrap();
    h.session.ask("leave?").await.unwrap();
    assert_eq!(h.session.history().len(), 1);
    let indexed = h.store.count("Role_Based__hr").await.unwrap();

    h.session.change_role();
    assert!(h.session.role().is_none());
    assert_eq!(h.session.state(), PipelineState::ComponentsReady);
    assert!(h.session.history().is_empty());
    assert!(h.session.partitions().is_empty());
    assert_eq!(h.store.count("Role_Based__hr").await.unwrap(), indexed);

    // Reselecting the role can ask straight away against the persisted collection.
    h.session.select_role("HR").unwrap();
    assert_eq!(h.session.state(), PipelineState::ComponentsReady);
    h.session.ask("leave?").await.unwrap();
    assert_eq!(h.session.state(), PipelineState::IndexPopulated);
}

#[tokio::test]
async fn repeated_ingest_in_one_session_is_skipped() {
    let docs = seeded_store();
    let mut h = harness(docs.path(), Script::EchoSources, Settings::default());

    h.session.select_role("hr").unwrap();
    h.session.load_and_index().await.unwrap();
    let writes = h.store.write_calls();
    assert!(matches!(h.session.load_and_index().await.unwrap(), LoadOutcome::AlreadyIndexed));
    assert_eq!(h.store.write_calls(), writes);
}

#[tokio::test]
async fn citations_outside_the_context_are_flagged() {
    let docs = seeded_store();
    let mut h = harness(docs.path(), Script::Cite("hr_data.csv, finance/q4_budget.md"), Settings::default());

    h.session.select_role("hr").unwrap();
    h.session.load_and_index().await.unwrap();
    let answer = h.session.ask("Who works in finance?").await.unwrap();

    assert!(answer.context.iter().any(|p| p.source == "hr/hr_data.csv"));
    assert_eq!(answer.sources, vec!["hr/hr_data.csv"]);
    assert_eq!(answer.unverified_sources, vec!["finance/q4_budget.md"]);
    assert_eq!(answer.raw_sources, "hr_data.csv, finance/q4_budget.md");
}

#[tokio::test]
async fn generation_failure_is_retryable_and_not_recorded() {
    let docs = seeded_store();
    let mut h = harness(docs.path(), Script::Fail, Settings::default());

    h.session.select_role("hr").unwrap();
    h.session.load_and_index().await.unwrap();
    let err = h.session.ask("leave?").await.unwrap_err();
    assert!(err.is_retryable());
    assert!(h.session.history().is_empty());
    assert_eq!(h.session.state(), PipelineState::IndexPopulated);
}

fn chunks(n: usize) -> Vec<rolerag_core::types::DocumentChunk> {
    let chunker = Chunker::new(ChunkingConfig::default()).unwrap();
    (0..n)
        .flat_map(|i| {
            chunker.split_document(&Document {
                doc_id: format!("doc{i}"),
                path: format!("/data/hr/doc{i}.md").into(),
                partition: Partition::new("hr"),
                kind: DocumentKind::Markdown,
                content: format!("Policy number {i} applies to all staff."),
            })
        })
        .collect()
}

#[tokio::test]
async fn indexing_nothing_writes_nothing() {
    let store = Arc::new(MemoryVectorStore::new());
    let indexer = Indexer::new(Arc::new(FakeEmbedder::default()), store.clone());
    let report = indexer.index("c", &[]).await.unwrap();
    assert_eq!(report.written, 0);
    assert_eq!(report.skipped, 0);
    assert_eq!(store.write_calls(), 0);
}

#[tokio::test]
async fn indexing_writes_in_batches() {
    let store = Arc::new(MemoryVectorStore::new());
    let indexer = Indexer::new(Arc::new(FakeEmbedder::default()), store.clone()).with_batch_size(2);
    let report = indexer.index("c", &chunks(5)).await.unwrap();
    assert_eq!(report.written, 5);
    assert_eq!(store.write_calls(), 3);
    assert_eq!(store.count("c").await.unwrap(), 5);
}

#[tokio::test]
async fn append_duplicates_and_content_hash_skips() {
    let input = chunks(3);

    let appending = Arc::new(MemoryVectorStore::new());
    let indexer = Indexer::new(Arc::new(FakeEmbedder::default()), appending.clone());
    indexer.index("c", &input).await.unwrap();
    indexer.index("c", &input).await.unwrap();
    assert_eq!(appending.count("c").await.unwrap(), 6);

    let deduping = Arc::new(MemoryVectorStore::new());
    let indexer = Indexer::new(Arc::new(FakeEmbedder::default()), deduping.clone())
        .with_dedup(DedupPolicy::ContentHash);
    indexer.index("c", &input).await.unwrap();
    let second = indexer.index("c", &input).await.unwrap();
    assert_eq!(second.written, 0);
    assert_eq!(second.skipped, 3);
    assert_eq!(deduping.count("c").await.unwrap(), 3);
}

/// Wraps [`FakeEmbedder`] and records the thread of every call.
struct ThreadRecordingEmbedder {
    inner: FakeEmbedder,
    threads: Mutex<Vec<std::thread::ThreadId>>,
}

impl Embedder for ThreadRecordingEmbedder {
    fn embedder_id(&self) -> &str { self.inner.embedder_id() }
    fn dim(&self) -> usize { self.inner.dim() }
    fn max_len(&self) -> usize { self.inner.max_len() }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.threads.lock().unwrap().push(std::thread::current().id());
        self.inner.embed_batch(texts)
    }
}

#[tokio::test]
async fn embedding_runs_off_the_async_thread() {
    let embedder = Arc::new(ThreadRecordingEmbedder { inner: FakeEmbedder::default(), threads: Mutex::new(Vec::new()) });
    let store = Arc::new(MemoryVectorStore::new());
    let runtime_thread = std::thread::current().id();

    let indexer = Indexer::new(embedder.clone(), store.clone());
    indexer.index("c", &chunks(2)).await.unwrap();
    let answerer = Answerer::new(embedder.clone(), store, ScriptedGenerator::new(Script::EchoSources));
    answerer.answer("c", &[Partition::new("hr")], "policy?").await.unwrap();

    let threads = embedder.threads.lock().unwrap().clone();
    assert_eq!(threads.len(), 2);
    assert!(threads.iter().all(|t| *t != runtime_thread));
}

fn fake_context() -> RagContext {
    RagContext::new(
        Arc::new(FakeEmbedder::default()),
        Arc::new(MemoryVectorStore::new()),
        ScriptedGenerator::new(Script::EchoSources),
        Settings::default(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_use_initializes_once() {
    let cell = Arc::new(ContextCell::new());
    let inits = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cell = cell.clone();
            let inits = inits.clone();
            tokio::spawn(async move {
                cell.get_or_init(|| async {
                    inits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    Ok(fake_context())
                })
                .await
                .map(|ctx| ctx.embedder.dim())
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 384);
    }
    assert_eq!(inits.load(Ordering::SeqCst), 1);
    assert!(cell.is_ready());
    assert_eq!(cell.state(), PipelineState::ComponentsReady);
}

#[tokio::test]
async fn failed_initialization_can_be_retried() {
    let cell = ContextCell::new();
    let err = cell
        .get_or_init(|| async { Err(Error::init("generation service", "GROQ_API_KEY is not set")) })
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::Initialization { component: "generation service", .. }));
    assert!(!cell.is_ready());
    assert_eq!(cell.state(), PipelineState::Uninitialized);

    cell.get_or_init(|| async { Ok(fake_context()) }).await.unwrap();
    assert!(cell.get().is_some());
}

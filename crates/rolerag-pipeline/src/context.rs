//! Service handles shared by every session, and their one-time construction.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

use rolerag_core::config::Settings;
use rolerag_core::traits::{Embedder, Generator, VectorStore};
use rolerag_core::{Error, Result};
use rolerag_embed::get_default_embedder;
use rolerag_generate::ChatCompletionsGenerator;
use rolerag_vector::LanceVectorStore;

/// Lifecycle of the pipeline. Services go from `Uninitialized` to
/// `ComponentsReady` once per process; a role's index goes from
/// `ComponentsReady` to `IndexPopulated` once per role selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Services are not built yet.
    Uninitialized,
    /// Services are built; the current role's documents are not indexed.
    ComponentsReady,
    /// The current role's documents are indexed and questions are accepted.
    IndexPopulated,
}

/// Embedding, vector store and generation handles plus the settings they
/// were built from. Cheap to clone.
#[derive(Clone)]
pub struct RagContext {
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
    pub generator: Arc<dyn Generator>,
    pub settings: Arc<Settings>,
}

impl RagContext {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn Generator>,
        settings: Settings,
    ) -> Self {
        Self { embedder, store, generator, settings: Arc::new(settings) }
    }

    /// Build the production services: the generator first so a missing API
    /// key fails before any model is loaded.
    pub async fn from_settings(settings: Settings, base: &Path) -> Result<Self> {
        let generator = ChatCompletionsGenerator::from_settings(&settings.generation)?;
        info!(model = generator.model(), "generation service ready");

        let emb_settings = settings.embedding.clone();
        let embedder = tokio::task::spawn_blocking(move || get_default_embedder(&emb_settings))
            .await
            .map_err(|e| Error::init("embedding model", e))??;
        let embedder: Arc<dyn Embedder> = Arc::from(embedder);

        let store = LanceVectorStore::open(&settings.vectorstore_dir(base), embedder.dim()).await?;
        Ok(Self::new(embedder, Arc::new(store), Arc::new(generator), settings))
    }
}

/// Run a (possibly model-backed) embedding call on the blocking pool so large
/// batches do not stall the async workers.
pub(crate) async fn embed_blocking(embedder: &Arc<dyn Embedder>, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
    let embedder = Arc::clone(embedder);
    tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
        .await
        .map_err(Error::embedding)?
}

/// Lazily initialised, process-wide [`RagContext`].
///
/// Concurrent first callers race on the cell, not on a flag: exactly one
/// initializer runs and the others wait for its result. A failed
/// initialization leaves the cell empty so a later call can retry.
#[derive(Default)]
pub struct ContextCell {
    cell: OnceCell<RagContext>,
}

impl ContextCell {
    pub fn new() -> Self { Self::default() }

    pub fn is_ready(&self) -> bool { self.cell.initialized() }

    pub fn state(&self) -> PipelineState {
        if self.is_ready() { PipelineState::ComponentsReady } else { PipelineState::Uninitialized }
    }

    pub fn get(&self) -> Option<&RagContext> { self.cell.get() }

    pub async fn get_or_init<F, Fut>(&self, init: F) -> Result<&RagContext>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RagContext>>,
    {
        self.cell.get_or_try_init(init).await
    }
}

//! Role-scoped conversation: select a role, ingest its partitions, ask.

use tracing::{info, warn};

use rolerag_core::config::IndexScope;
use rolerag_core::loader::LoadFailure;
use rolerag_core::types::{Answer, Partition};
use rolerag_core::{AccessPolicy, Chunker, DocumentLoader, Error, Result, Role};

use crate::answerer::Answerer;
use crate::context::{PipelineState, RagContext};
use crate::indexer::{IndexReport, Indexer};

#[derive(Debug)]
pub enum LoadOutcome {
    /// The role is authorized but none of its partitions yielded a document.
    NoDocuments { failures: Vec<LoadFailure> },
    Indexed {
        documents: usize,
        chunks: usize,
        report: IndexReport,
        failures: Vec<LoadFailure>,
    },
    /// Documents were already ingested for the current role.
    AlreadyIndexed,
}

#[derive(Debug, Clone)]
pub struct Exchange {
    pub question: String,
    pub answer: Answer,
}

pub struct Session {
    ctx: RagContext,
    policy: AccessPolicy,
    loader: DocumentLoader,
    chunker: Chunker,
    role: Option<Role>,
    partitions: Vec<Partition>,
    docs_loaded: bool,
    history: Vec<Exchange>,
}

impl Session {
    pub fn new(ctx: RagContext, policy: AccessPolicy, loader: DocumentLoader) -> Result<Self> {
        let chunker = Chunker::new(ctx.settings.chunking.clone())?;
        Ok(Self {
            ctx,
            policy,
            loader,
            chunker,
            role: None,
            partitions: Vec::new(),
            docs_loaded: false,
            history: Vec::new(),
        })
    }

    /// A session is built from ready services, so it never reports
    /// [`PipelineState::Uninitialized`]. Whether a role is selected is
    /// [`Self::role`].
    pub fn state(&self) -> PipelineState {
        if self.docs_loaded {
            PipelineState::IndexPopulated
        } else {
            PipelineState::ComponentsReady
        }
    }

    pub fn role(&self) -> Option<Role> { self.role }

    pub fn partitions(&self) -> &[Partition] { &self.partitions }

    pub fn history(&self) -> &[Exchange] { &self.history }

    /// Selecting a role never touches the index; an unauthorized role leaves
    /// the session unchanged.
    pub fn select_role(&mut self, role: &str) -> Result<&[Partition]> {
        let (role, partitions) = self.policy.authorize(role)?;
        if self.role != Some(role) {
            self.docs_loaded = false;
        }
        info!(%role, partitions = ?partitions.iter().map(Partition::as_str).collect::<Vec<_>>(), "role selected");
        self.role = Some(role);
        self.partitions = partitions;
        if self.ctx.settings.index.scope == IndexScope::Shared {
            warn!(%role, "shared index scope: retrieval is filtered by partition but the collection holds every role's chunks");
        }
        Ok(&self.partitions)
    }

    /// Collection the current role reads and writes.
    pub fn collection(&self) -> Result<String> {
        let role = self.role.ok_or(Error::QueryPrecondition)?;
        Ok(collection_name(&self.ctx.settings.data.collection, self.ctx.settings.index.scope, role))
    }

    pub async fn load_and_index(&mut self) -> Result<LoadOutcome> {
        let collection = self.collection()?;
        if self.docs_loaded {
            return Ok(LoadOutcome::AlreadyIndexed);
        }
        let loaded = self.loader.load(&self.partitions);
        for failure in &loaded.failures {
            warn!(partition = %failure.partition, path = %failure.path.display(), reason = %failure.reason, "document skipped");
        }
        if loaded.is_empty() {
            return Ok(LoadOutcome::NoDocuments { failures: loaded.failures });
        }

        let chunks = self.chunker.split(&loaded.documents);
        let settings = &self.ctx.settings;
        let indexer = Indexer::new(self.ctx.embedder.clone(), self.ctx.store.clone())
            .with_batch_size(settings.embedding.batch_size)
            .with_dedup(settings.index.dedup);
        let report = indexer.index(&collection, &chunks).await?;
        self.docs_loaded = true;
        Ok(LoadOutcome::Indexed {
            documents: loaded.documents.len(),
            chunks: chunks.len(),
            report,
            failures: loaded.failures,
        })
    }

    /// Answer against the current role's collection. Records an earlier run
    /// wrote for this role's partitions count as indexed; records of other
    /// partitions in a shared collection do not.
    pub async fn ask(&mut self, question: &str) -> Result<Answer> {
        let collection = self.collection()?;
        if !self.docs_loaded {
            if self.ctx.store.count_in(&collection, &self.partitions).await? == 0 {
                return Err(Error::QueryPrecondition);
            }
            self.docs_loaded = true;
        }
        let settings = &self.ctx.settings;
        let answerer = Answerer::new(self.ctx.embedder.clone(), self.ctx.store.clone(), self.ctx.generator.clone())
            .with_top_k(settings.retrieval.top_k)
            .with_sampling(settings.generation.temperature, settings.generation.max_tokens);
        let answer = answerer.answer(&collection, &self.partitions, question).await?;
        self.history.push(Exchange { question: question.to_string(), answer: answer.clone() });
        Ok(answer)
    }

    /// Back to role selection. Shared services and the persisted index stay.
    pub fn change_role(&mut self) {
        self.role = None;
        self.partitions.clear();
        self.docs_loaded = false;
        self.history.clear();
    }
}

pub fn collection_name(base: &str, scope: IndexScope, role: Role) -> String {
    match scope {
        IndexScope::PerRole => format!("{base}__{role}"),
        IndexScope::Shared => base.to_string(),
    }
}

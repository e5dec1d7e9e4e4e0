//! Domain types shared by the loader, chunker, indexer and answerer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub type ChunkId = String;

/// A named, disjoint slice of the document corpus. On disk it is a top-level
/// directory under the documents root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Partition(String);

impl Partition {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A partition name must resolve to a single directory below the root.
    pub fn is_plain_name(&self) -> bool {
        !self.0.is_empty()
            && self.0 != "."
            && self.0 != ".."
            && !self.0.contains(['/', '\\'])
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Partition {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Markdown,
    Csv,
    Text,
}

impl DocumentKind {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "md" | "markdown" => Self::Markdown,
            "csv" => Self::Csv,
            _ => Self::Text,
        }
    }
}

/// Raw content of one file inside a partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub path: PathBuf,
    pub partition: Partition,
    pub kind: DocumentKind,
    pub content: String,
}

impl Document {
    /// Attribution label, `<partition>/<file name>`.
    pub fn source_label(&self) -> String {
        let file = self
            .path
            .file_name()
            .map_or_else(|| self.doc_id.clone(), |f| f.to_string_lossy().into_owned());
        format!("{}/{}", self.partition, file)
    }
}

/// A chunk of a source document that is independently embedded and stored.
///
/// - `id`: freshly generated UUID, unique across runs
/// - `doc_id`: file stem of the source document
/// - `doc_path`: original path to the source file
/// - `partition`: partition the source document was read from
/// - `source`: attribution label handed to the generator
/// - `content_hash`: blake3 of `content`, used by the content-hash dedup policy
/// - `chunk_index`/`total_chunks`: position within the parent document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: ChunkId,
    pub doc_id: String,
    pub doc_path: String,
    pub partition: Partition,
    pub source: String,
    pub content: String,
    pub content_hash: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

/// The persisted unit of the vector index.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub chunk: DocumentChunk,
    pub vector: Vec<f32>,
}

/// A retrieved chunk. `score` is store-specific but higher is always better.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// One retrieved passage as presented to the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextPassage {
    pub content: String,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub question: String,
    pub context: Vec<ContextPassage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Raw generator output: the answer and the model's own attribution text,
/// which may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub answer: String,
    pub attribution: String,
}

/// Final answer returned to callers.
///
/// `sources` are the attributed sources that match a passage actually handed
/// to the generator; `unverified_sources` are the ones that do not. Both come
/// from the model's attribution and are advisory.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<String>,
    pub unverified_sources: Vec<String>,
    pub raw_sources: String,
    pub context: Vec<ContextPassage>,
}

//! Splits documents into overlapping, bounded chunks.
//!
//! Lengths are counted in characters. Each chunk ends on the best boundary
//! available inside its window (paragraph, line, sentence, whitespace, in
//! that order) or is hard-cut at `chunk_size`. The next chunk restarts
//! `chunk_overlap` characters before the previous end.
//!
//! Windows that hold only whitespace are dropped. Neighbouring chunks share
//! exactly `chunk_overlap` characters unless such a window was dropped
//! between them, which needs a whitespace run longer than
//! `chunk_size - chunk_overlap`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{Document, DocumentChunk};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Boundaries in priority order. A chunk ends right after the separator.
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separators: ["\n\n", "\n", ".", " "].iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        let config = Self { chunk_size, chunk_overlap, ..Self::default() };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
    separators: Vec<Vec<char>>,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        let separators = config
            .separators
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.chars().collect())
            .collect();
        Ok(Self { config, separators })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    pub fn split(&self, documents: &[Document]) -> Vec<DocumentChunk> {
        documents.iter().flat_map(|d| self.split_document(d)).collect()
    }

    pub fn split_document(&self, document: &Document) -> Vec<DocumentChunk> {
        let pieces = self.split_text(&document.content);
        let total_chunks = pieces.len();
        let doc_path = document.path.to_string_lossy().into_owned();
        let source = document.source_label();
        pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_index, content)| DocumentChunk {
                id: Uuid::new_v4().to_string(),
                doc_id: document.doc_id.clone(),
                doc_path: doc_path.clone(),
                partition: document.partition.clone(),
                source: source.clone(),
                content_hash: blake3::hash(content.as_bytes()).to_hex().to_string(),
                content,
                chunk_index,
                total_chunks,
            })
            .collect()
    }

    /// Split raw text. Whitespace-only windows are dropped after windowing,
    /// so the chunks on either side of one do not overlap each other.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let (size, overlap) = (self.config.chunk_size, self.config.chunk_overlap);
        let mut pieces = Vec::new();
        let mut start = 0usize;
        while start < chars.len() {
            if chars.len() - start <= size {
                pieces.push(chars[start..].iter().collect::<String>());
                break;
            }
            let window_end = start + size;
            let end = self.find_boundary(&chars, start, window_end).unwrap_or(window_end);
            pieces.push(chars[start..end].iter().collect::<String>());
            // end > start + overlap, so this always advances
            start = end - overlap;
        }
        pieces.retain(|p| !p.trim().is_empty());
        pieces
    }

    /// End position (exclusive) just after the last highest-priority separator
    /// that fits in `[start, window_end]` and leaves room to advance.
    fn find_boundary(&self, chars: &[char], start: usize, window_end: usize) -> Option<usize> {
        let min_end = start + self.config.chunk_overlap;
        for sep in &self.separators {
            if sep.len() > window_end - start {
                continue;
            }
            let mut pos = window_end - sep.len();
            loop {
                let end = pos + sep.len();
                if end <= min_end {
                    break;
                }
                if chars[pos..end] == sep[..] {
                    return Some(end);
                }
                if pos == start {
                    break;
                }
                pos -= 1;
            }
        }
        None
    }
}

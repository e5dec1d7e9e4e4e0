//! rolerag-core
//!
//! Role-gated document access, loading and chunking, plus the service traits
//! the rest of the workspace plugs into. See `access`, `loader` and `chunker`
//! for the ingestion side and `traits` for the embedding, vector store and
//! generation seams.

pub mod access;
pub mod chunker;
pub mod config;
pub mod error;
pub mod loader;
pub mod traits;
pub mod types;

pub use access::{AccessPolicy, Role};
pub use chunker::{Chunker, ChunkingConfig};
pub use error::{Error, Result};
pub use loader::{DocumentLoader, LoadFailure, LoadReport};

//! rolerag-vector
//!
//! Vector store implementations: `LanceVectorStore` persists collections as
//! LanceDB tables under a directory; `MemoryVectorStore` keeps them in
//! process. Both are append-only and filter search results by partition.

pub mod lance;
pub mod memory;
pub mod schema;
pub mod table;

pub use lance::LanceVectorStore;
pub use memory::MemoryVectorStore;

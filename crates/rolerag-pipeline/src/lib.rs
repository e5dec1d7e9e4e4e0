pub mod answerer;
pub mod context;
pub mod indexer;
pub mod session;

pub use answerer::{verify_sources, Answerer};
pub use context::{ContextCell, PipelineState, RagContext};
pub use indexer::{IndexReport, Indexer};
pub use session::{collection_name, Exchange, LoadOutcome, Session};

//! rolerag-generate
//!
//! Answer generation over retrieved passages through an OpenAI-compatible
//! chat-completions API. `prompt` holds the prompt template and the parser
//! that separates the answer from the model's `SOURCES:` attribution.

pub mod client;
pub mod prompt;

pub use client::ChatCompletionsGenerator;

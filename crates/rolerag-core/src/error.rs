use thiserror::Error;

/// Failures surfaced by the retrieval pipeline.
///
/// Partial load failures are not represented here: the loader reports them in
/// [`crate::loader::LoadReport`] and keeps going.
#[derive(Debug, Error)]
pub enum Error {
    #[error("role '{role}' has no document access")]
    AuthorizationEmpty { role: String },

    #[error("failed to initialize {component}: {message}")]
    Initialization { component: &'static str, message: String },

    #[error("vector index is not populated; load documents for a role before asking")]
    QueryPrecondition,

    #[error("generation failed: {message}")]
    Generation { message: String, retryable: bool },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("vector store error: {0}")]
    Store(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn init(component: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Initialization { component, message: err.to_string() }
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }

    pub fn embedding(err: impl std::fmt::Display) -> Self {
        Self::Embedding(err.to_string())
    }

    /// The same request may succeed if resubmitted unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Generation { retryable: true, .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_generation_failures_are_retryable() {
        let gen = Error::Generation { message: "timeout".into(), retryable: true };
        assert!(gen.is_retryable());
        assert!(!Error::QueryPrecondition.is_retryable());
        assert!(!Error::init("llm", "missing key").is_retryable());
    }
}

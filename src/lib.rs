use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Dimension mismatch: index expects {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Source '{source_id}' unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    #[error("Classification ambiguous: {0}")]
    ClassificationAmbiguous(String),

    #[error("All selected sources failed")]
    AllSourcesFailed,

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Timed out after {seconds}s: {operation}")]
    Timeout { operation: String, seconds: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Whether this error should abort the calling operation rather than
    /// degrade the current query.
    #[inline]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameter(_) | Self::DimensionMismatch { .. } | Self::Config(_)
        )
    }
}

pub mod assistant;
pub mod commands;
pub mod config;
pub mod deadline;
pub mod documents;
pub mod embeddings;
pub mod index;
pub mod memory;
pub mod model;
pub mod observer;
pub mod ollama;
pub mod retrieval;
pub mod search;

#[cfg(test)]
pub(crate) mod test_support;

pub use assistant::{Assistant, IndexHandle};
pub use retrieval::router::{ClassificationConfig, ClassificationMode, RoutingFallback, RoutingStrategy};

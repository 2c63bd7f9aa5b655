use thiserror::Error;

use crate::types::EmbeddingSpace;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Persisted index or catalog state that breaks the position/ID invariants.
    #[error("Malformed persisted state: {0}")]
    MalformedState(String),

    #[error("Embedding space mismatch: index holds {expected} vectors, got {actual}")]
    SpaceMismatch { expected: EmbeddingSpace, actual: EmbeddingSpace },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Embedding or generation service failure.
    #[error("Upstream service failed: {0}")]
    Upstream(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

impl Error {
    pub fn upstream(err: impl std::fmt::Display) -> Self {
        Self::Upstream(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

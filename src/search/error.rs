use std::path::PathBuf;

use thiserror::Error;

use super::engine::EngineState;

pub type Result<T, E = SearchError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("embedding model '{name}' is not available: {reason}")]
    ModelUnavailable { name: String, reason: String },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("dimension mismatch: index has {expected}, vector has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("index I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("index sidecar is not valid JSON: {0}")]
    Sidecar(#[from] serde_json::Error),

    #[error("index is corrupt: {0}")]
    Corrupt(String),

    #[error("retrieval engine is not ready (state: {0})")]
    NotReady(EngineState),
}

impl SearchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

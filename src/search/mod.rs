//! Schema retrieval
//!
//! Embeds table descriptions, keeps a persisted flat index in step with the
//! catalog, and ranks tables for a query with a keyword fallback.

pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;

pub use embedding::{load_embedder, Embedder, HtpEmbedder};
pub use engine::{
    keyword_search, EngineState, ReloadReport, RetrievalEngine, SearchHit, SearchMode,
    SearchOutcome, DEFAULT_TOP_K,
};
pub use error::SearchError;
pub use index::{FlatIndex, IndexOrigin, IndexStats, IndexStore, Neighbor};

//! schema-scout library
//!
//! Schema retrieval for natural-language-to-SQL: turns a free-text question
//! into a short, ranked list of relevant database tables.
//!
//! # Modules
//!
//! - `core`: schema catalog, schema store and source, settings, status
//! - `search`: embeddings, persisted vector index, retrieval engine

pub mod core;
pub mod search;

// Re-exports for convenience
pub use core::catalog::{
    render_schema_context, CatalogError, CatalogSnapshot, ColumnDescriptor, RawSchema,
    TableDescriptor,
};
pub use core::config::Settings;
pub use core::paths::DataPaths;
pub use search::{RetrievalEngine, SearchError, SearchHit, DEFAULT_TOP_K};

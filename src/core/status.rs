//! Schema and index status report shared by the CLI and the MCP server

use serde::Serialize;

use super::catalog::CatalogSnapshot;
use super::paths::DataPaths;
use super::source::SchemaStore;
use crate::search::index::{IndexStats, IndexStore};

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub schema_available: bool,
    pub last_updated: Option<String>,
    pub schema_tables_count: Option<usize>,
    pub index: Option<IndexStats>,
    /// Whether the persisted index matches the cached schema
    pub index_valid: Option<bool>,
}

/// `embedder_id` is the model the index would be loaded with; an index built
/// by another model is reported as invalid
pub fn collect_status(paths: &DataPaths, embedder_id: &str) -> StatusReport {
    let store = SchemaStore::new(paths);
    let index_store = IndexStore::new(paths);

    let schema = store.load().ok();
    let last_updated = store
        .last_fetch()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string());
    let index = index_store.stats().ok().flatten();
    let index_valid = schema
        .as_ref()
        .map(|raw| index_store.is_valid_for(&CatalogSnapshot::build(raw), embedder_id));

    StatusReport {
        schema_available: store.exists(),
        last_updated,
        schema_tables_count: schema.as_ref().map(|s| s.len()),
        index,
        index_valid,
    }
}

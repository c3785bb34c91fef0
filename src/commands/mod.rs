pub mod index;
pub mod search;
pub mod status;
pub mod tables;
pub mod update;
pub mod validate;

use anyhow::{Context, Result};

use schema_scout::core::catalog::RawSchema;
use schema_scout::core::config::Settings;
use schema_scout::core::source::{load_schema, JsonFileSource, SchemaOrigin, SchemaSource, SchemaStore};
use schema_scout::search::{load_embedder, ReloadReport, RetrievalEngine};

/// The configured metadata export, if any
pub fn configured_source(settings: &Settings) -> Option<JsonFileSource> {
    settings
        .schema_source
        .as_ref()
        .map(|path| JsonFileSource::new(path.clone()))
}

/// Id the configured model records in the index; unknown models keep the
/// configured name, which matches no index
pub fn configured_embedder_id(settings: &Settings) -> String {
    load_embedder(&settings.embedding_model)
        .map(|e| e.id().to_string())
        .unwrap_or_else(|_| settings.embedding_model.clone())
}

/// Cached schema, falling back to the configured source
pub fn load_raw_schema(settings: &Settings) -> Result<(RawSchema, SchemaOrigin)> {
    let store = SchemaStore::new(&settings.paths());
    let source = configured_source(settings);
    load_schema(&store, source.as_ref().map(|s| s as &dyn SchemaSource))
        .context("Schema not available")
}

/// Load the schema and bring up a ready engine over it
pub fn open_engine(settings: &Settings) -> Result<(RetrievalEngine, RawSchema, ReloadReport)> {
    let (raw, _) = load_raw_schema(settings)?;
    let engine = RetrievalEngine::new(settings).context("Failed to load embedding model")?;
    let report = engine.reload(&raw).context("Failed to load schema index")?;
    Ok((engine, raw, report))
}
